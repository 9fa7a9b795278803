use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::launcher::TrackerLauncher;
use super::protocol::TrackerConnector;
use super::session::TrackerSession;
use crate::discovery::PeerSink;
use crate::torrent::{TorrentOrigin, TorrentSession};

/// Registry of every tracker the client knows, keyed by announce URL.
///
/// Also holds the default announce list that non-private torrents and
/// magnet links are topped up with, and what a launcher needs to announce
/// on our behalf.
pub struct TrackerContext {
    sessions: DashMap<String, Arc<TrackerSession>>,
    defaults: RwLock<Vec<String>>,
    next_id: AtomicU64,
    connector: TrackerConnector,
    sink: PeerSink,
    peer_id: [u8; 20],
    port: u16,
}

impl TrackerContext {
    pub fn new(connector: TrackerConnector, sink: PeerSink, peer_id: [u8; 20], port: u16) -> Self {
        Self {
            sessions: DashMap::new(),
            defaults: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            connector,
            sink,
            peer_id,
            port,
        }
    }

    pub fn set_defaults(&self, announces: Vec<String>) {
        debug!("{} default trackers", announces.len());
        *self.defaults.write() = announces;
    }

    pub fn defaults(&self) -> Vec<String> {
        self.defaults.read().clone()
    }

    /// The session for `url`, created on first sight. Blank or unsupported
    /// URLs yield `None`.
    pub fn session(&self, url: &str) -> Option<Arc<TrackerSession>> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        if let Some(existing) = self.sessions.get(url) {
            return Some(existing.clone());
        }

        let protocol = match (self.connector)(url) {
            Ok(protocol) => protocol,
            Err(e) => {
                warn!(tracker = %url, "skipping tracker: {}", e);
                return None;
            }
        };

        let session = self
            .sessions
            .entry(url.to_string())
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                debug!(tracker = %url, id, "new tracker");
                Arc::new(TrackerSession::new(id, url, protocol))
            })
            .clone();

        Some(session)
    }

    /// Sessions for a `.torrent` origin. Private torrents only ever talk to
    /// their own trackers.
    pub fn sessions_for_torrent(
        &self,
        announce: Option<&str>,
        announce_list: &[String],
        private: bool,
    ) -> Vec<Arc<TrackerSession>> {
        let own = announce.into_iter().chain(announce_list.iter().map(String::as_str));
        if private {
            self.collect(own)
        } else {
            let defaults = self.defaults();
            self.collect(own.chain(defaults.iter().map(String::as_str)))
        }
    }

    pub fn sessions_for_magnet(&self, trackers: &[String]) -> Vec<Arc<TrackerSession>> {
        let defaults = self.defaults();
        self.collect(
            trackers
                .iter()
                .chain(defaults.iter())
                .map(String::as_str),
        )
    }

    pub fn default_sessions(&self) -> Vec<Arc<TrackerSession>> {
        let defaults = self.defaults();
        self.collect(defaults.iter().map(String::as_str))
    }

    pub fn sessions_for(&self, torrent: &TorrentSession) -> Vec<Arc<TrackerSession>> {
        match torrent.origin() {
            TorrentOrigin::Torrent {
                announce,
                announce_list,
            } => self.sessions_for_torrent(announce.as_deref(), announce_list, torrent.is_private()),
            TorrentOrigin::Magnet { trackers } => self.sessions_for_magnet(trackers),
            TorrentOrigin::Other => self.default_sessions(),
        }
    }

    /// Every known session, available or not.
    pub fn sessions(&self) -> Vec<Arc<TrackerSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn build_launcher(
        &self,
        session: Arc<TrackerSession>,
        torrent: Arc<TorrentSession>,
    ) -> TrackerLauncher {
        TrackerLauncher::new(session, torrent, self.sink.clone(), self.peer_id, self.port)
    }

    fn collect<'a>(&self, urls: impl Iterator<Item = &'a str>) -> Vec<Arc<TrackerSession>> {
        let mut seen = HashSet::new();
        urls.filter_map(|url| self.session(url))
            .filter(|session| seen.insert(session.id()))
            .collect()
    }
}
