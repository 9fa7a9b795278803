use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::TrackerContext;
use super::error::TrackerError;
use super::response::{AnnounceRequest, ScrapeFile, TrackerEvent};
use super::session::TrackerSession;
use crate::constants::DEFAULT_NUM_WANT;
use crate::discovery::{PeerSink, PeerSource};
use crate::torrent::TorrentSession;

/// Transfer counters reported to trackers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

/// Outcome of the last successful announce.
#[derive(Debug, Clone, Copy)]
pub struct AnnounceResult {
    pub interval: Duration,
    pub seeders: Option<u32>,
    pub leechers: Option<u32>,
    pub peers: usize,
    pub at: Instant,
}

#[derive(Default)]
struct LauncherState {
    announced: bool,
    released: bool,
    last: Option<AnnounceResult>,
}

/// Announces one torrent to one tracker.
pub struct TrackerLauncher {
    session: Arc<TrackerSession>,
    torrent: Arc<TorrentSession>,
    sink: PeerSink,
    peer_id: [u8; 20],
    port: u16,
    stats: Mutex<TransferStats>,
    state: Mutex<LauncherState>,
}

impl TrackerLauncher {
    pub fn new(
        session: Arc<TrackerSession>,
        torrent: Arc<TorrentSession>,
        sink: PeerSink,
        peer_id: [u8; 20],
        port: u16,
    ) -> Self {
        Self {
            session,
            torrent,
            sink,
            peer_id,
            port,
            stats: Mutex::new(TransferStats::default()),
            state: Mutex::new(LauncherState::default()),
        }
    }

    pub fn announce_url(&self) -> &str {
        self.session.announce_url()
    }

    pub fn session(&self) -> &Arc<TrackerSession> {
        &self.session
    }

    pub fn last_result(&self) -> Option<AnnounceResult> {
        self.state.lock().last
    }

    pub fn set_stats(&self, stats: TransferStats) {
        *self.stats.lock() = stats;
    }

    /// Announces and publishes the returned peers. Failures are counted
    /// against the tracker and logged, never returned.
    pub async fn find_peer(&self) {
        if !self.session.available() {
            debug!(tracker = %self.announce_url(), "tracker unavailable, skipping");
            return;
        }

        let event = {
            let state = self.state.lock();
            if state.released {
                return;
            }
            if state.announced {
                TrackerEvent::None
            } else {
                TrackerEvent::Started
            }
        };

        let info_hash = *self.torrent.info_hash();
        match self.session.protocol().announce(self.request(event)).await {
            Ok(response) => {
                let peers = self
                    .sink
                    .publish_all(info_hash, response.peers, PeerSource::Tracker);
                if let Some(warning) = &response.warning_message {
                    warn!(tracker = %self.announce_url(), "tracker warning: {}", warning);
                }
                info!(
                    %info_hash,
                    tracker = %self.announce_url(),
                    "tracker returned {} peers", peers
                );

                let mut state = self.state.lock();
                state.announced = true;
                state.last = Some(AnnounceResult {
                    interval: Duration::from_secs(response.interval.into()),
                    seeders: response.complete,
                    leechers: response.incomplete,
                    peers,
                    at: Instant::now(),
                });
            }
            Err(e) => {
                let failures = self.session.record_failure();
                warn!(
                    %info_hash,
                    tracker = %self.announce_url(),
                    failures,
                    "announce failed: {}", e
                );
            }
        }
    }

    pub async fn scrape(&self) -> Result<Option<ScrapeFile>, TrackerError> {
        let info_hash = *self.torrent.info_hash();
        let response = self.session.protocol().scrape(vec![info_hash]).await?;
        Ok(response.get(&info_hash).copied())
    }

    /// Tells the tracker we are leaving, if we ever announced to it.
    pub async fn release(&self) {
        let announced = {
            let mut state = self.state.lock();
            let announced = state.announced && !state.released;
            state.released = true;
            announced
        };
        if !announced {
            return;
        }

        if let Err(e) = self
            .session
            .protocol()
            .announce(self.request(TrackerEvent::Stopped))
            .await
        {
            debug!(tracker = %self.announce_url(), "stopped announce failed: {}", e);
        }
    }

    fn request(&self, event: TrackerEvent) -> AnnounceRequest {
        let stats = *self.stats.lock();
        AnnounceRequest {
            info_hash: *self.torrent.info_hash(),
            peer_id: self.peer_id,
            port: self.port,
            uploaded: stats.uploaded,
            downloaded: stats.downloaded,
            left: stats.left,
            event,
            num_want: DEFAULT_NUM_WANT,
        }
    }
}

/// Every tracker launcher of one torrent.
pub struct TrackerLauncherGroup {
    torrent: Arc<TorrentSession>,
    context: Arc<TrackerContext>,
    launchers: RwLock<Vec<Arc<TrackerLauncher>>>,
}

impl TrackerLauncherGroup {
    pub fn new(torrent: Arc<TorrentSession>, context: Arc<TrackerContext>) -> Self {
        Self {
            torrent,
            context,
            launchers: RwLock::new(Vec::new()),
        }
    }

    pub fn torrent(&self) -> &Arc<TorrentSession> {
        &self.torrent
    }

    pub fn trackers(&self) -> Vec<String> {
        self.launchers
            .read()
            .iter()
            .map(|launcher| launcher.announce_url().to_string())
            .collect()
    }

    /// Builds a launcher for every tracker the torrent's origin calls for.
    pub fn load_tracker(&self) {
        let launchers: Vec<_> = self
            .context
            .sessions_for(&self.torrent)
            .into_iter()
            .map(|session| Arc::new(self.context.build_launcher(session, self.torrent.clone())))
            .collect();

        debug!(
            info_hash = %self.torrent.info_hash(),
            "loaded {} trackers", launchers.len()
        );
        self.launchers.write().extend(launchers);
    }

    /// Announces to every tracker. The list is copied first so a concurrent
    /// [`release`](Self::release) never waits on the network.
    pub async fn find_peer(&self) {
        let launchers = self.launchers.read().clone();
        futures::future::join_all(launchers.iter().map(|launcher| launcher.find_peer())).await;
    }

    pub fn set_stats(&self, stats: TransferStats) {
        for launcher in self.launchers.read().iter() {
            launcher.set_stats(stats);
        }
    }

    /// Empties the group; each launcher sends its `stopped` announce on a
    /// background task.
    pub fn release(&self) {
        let launchers = std::mem::take(&mut *self.launchers.write());
        debug!(
            info_hash = %self.torrent.info_hash(),
            "releasing {} trackers", launchers.len()
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime, skipping stopped announces");
            return;
        };
        for launcher in launchers {
            handle.spawn(async move { launcher.release().await });
        }
    }

    /// Calls [`find_peer`](Self::find_peer) every `interval` until aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.find_peer().await;
            }
        })
    }
}
