//! The client-wide context that wires every discovery source together.
//!
//! A [`ClientContext`] owns the shared registries (torrents, trackers, DHT
//! routing table, µTP queue) and the background tasks driving them. Torrents
//! added to it are announced to their trackers, searched for in the DHT and,
//! through LSD, on the local network; every peer found lands in one
//! [`PeerSink`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::dht::{DhtClient, DhtError, DhtLauncher, NodeId, PeerQuery, RoutingTable};
use crate::discovery::{DiscoveredPeer, PeerSink};
use crate::lsd::{LsdError, LsdService};
use crate::peer::PeerId;
use crate::torrent::{InfoHash, TorrentContext, TorrentSession};
use crate::tracker::{
    default_connector, FileTrackerStore, MemoryTrackerStore, TrackerConfig, TrackerConnector,
    TrackerContext, TrackerError, TrackerLauncherGroup, TrackerStore,
};
use crate::utp::UtpRequestQueue;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("dht error: {0}")]
    Dht(#[from] DhtError),

    #[error("lsd error: {0}")]
    Lsd(#[from] LsdError),
}

/// Discovery state of one managed torrent.
struct Swarm {
    trackers: Arc<TrackerLauncherGroup>,
    dht: Option<Arc<DhtLauncher>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Swarm {
    fn stop(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.trackers.release();
    }
}

pub struct ClientContext {
    config: ClientConfig,
    peer_id: PeerId,
    store: Arc<dyn TrackerStore>,
    sink: PeerSink,
    torrents: Arc<TorrentContext>,
    trackers: Arc<TrackerContext>,
    routing_table: Arc<RoutingTable>,
    utp: UtpRequestQueue,
    dht: RwLock<Option<Arc<DhtClient>>>,
    swarms: DashMap<InfoHash, Swarm>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientContext {
    /// Builds the context and loads the default trackers from `store`.
    ///
    /// Must be called inside a tokio runtime: the µTP workers are spawned
    /// here.
    pub fn new(config: ClientConfig, store: Arc<dyn TrackerStore>) -> Result<Self, ClientError> {
        Self::with_connector(config, store, default_connector())
    }

    /// Uses the store named by `config.tracker_store`, or an in-memory one.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let store: Arc<dyn TrackerStore> = match &config.tracker_store {
            Some(path) => Arc::new(FileTrackerStore::new(path.clone())),
            None => Arc::new(MemoryTrackerStore::new()),
        };
        Self::new(config, store)
    }

    pub fn with_connector(
        config: ClientConfig,
        store: Arc<dyn TrackerStore>,
        connector: TrackerConnector,
    ) -> Result<Self, ClientError> {
        let peer_id = PeerId::generate();
        let sink = PeerSink::new();

        let trackers = Arc::new(TrackerContext::new(
            connector,
            sink.clone(),
            *peer_id.as_bytes(),
            config.listen_port,
        ));
        trackers.set_defaults(TrackerConfig::load(store.as_ref())?.into_announces());

        let utp = match config.utp_shards {
            Some(shards) => UtpRequestQueue::new(shards),
            None => UtpRequestQueue::with_default_shards(),
        };

        info!(peer_id = ?peer_id, "client context created");

        Ok(Self {
            config,
            peer_id,
            store,
            sink,
            torrents: Arc::new(TorrentContext::new()),
            trackers,
            routing_table: Arc::new(RoutingTable::new(NodeId::generate())),
            utp,
            dht: RwLock::new(None),
            swarms: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn sink(&self) -> &PeerSink {
        &self.sink
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.sink.subscribe()
    }

    pub fn torrents(&self) -> &Arc<TorrentContext> {
        &self.torrents
    }

    pub fn trackers(&self) -> &Arc<TrackerContext> {
        &self.trackers
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    pub fn utp(&self) -> &UtpRequestQueue {
        &self.utp
    }

    pub fn dht(&self) -> Option<Arc<DhtClient>> {
        self.dht.read().clone()
    }

    pub fn tracker_group(&self, info_hash: &InfoHash) -> Option<Arc<TrackerLauncherGroup>> {
        self.swarms.get(info_hash).map(|swarm| swarm.trackers.clone())
    }

    pub fn dht_launcher(&self, info_hash: &InfoHash) -> Option<Arc<DhtLauncher>> {
        self.swarms.get(info_hash).and_then(|swarm| swarm.dht.clone())
    }

    /// Binds the DHT socket and starts the background services. Torrents
    /// added before this get their DHT search now.
    pub async fn start(&self) -> Result<(), ClientError> {
        if self.dht.read().is_some() {
            debug!("client context already started");
            return Ok(());
        }

        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.config.dht_port);
        let dht = Arc::new(
            DhtClient::bind(bind, self.routing_table.clone(), self.sink.clone()).await?,
        );
        *self.dht.write() = Some(dht.clone());

        let mut tasks = vec![self.spawn_dht(dht.clone()), self.spawn_persist()];
        if self.config.lsd_enabled {
            match LsdService::bind(self.config.listen_port, self.torrents.clone(), self.sink.clone())
                .await
            {
                Ok(lsd) => tasks.push(Arc::new(lsd).start(self.config.lsd_interval())),
                Err(e) => warn!("local service discovery disabled: {}", e),
            }
        }
        self.tasks.lock().extend(tasks);

        for mut swarm in self.swarms.iter_mut() {
            let torrent = swarm.trackers.torrent().clone();
            if swarm.dht.is_none() && !torrent.is_private() {
                let (launcher, task) = self.launch_dht(dht.clone(), &torrent);
                swarm.dht = Some(launcher);
                swarm.tasks.push(task);
            }
        }

        info!("client context started");
        Ok(())
    }

    fn spawn_dht(&self, dht: Arc<DhtClient>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = dht.run().await {
                warn!("DHT receive loop stopped: {}", e);
            }
        })
    }

    fn spawn_persist(&self) -> JoinHandle<()> {
        let trackers = self.trackers.clone();
        let store = self.store.clone();
        let interval = self.config.tracker_persist_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = TrackerConfig::persist(&trackers, store.as_ref()) {
                    warn!("failed to persist trackers: {}", e);
                }
            }
        })
    }

    fn launch_dht(
        &self,
        dht: Arc<DhtClient>,
        torrent: &TorrentSession,
    ) -> (Arc<DhtLauncher>, JoinHandle<()>) {
        let query: Arc<dyn PeerQuery> = dht;
        let launcher = Arc::new(DhtLauncher::new(
            *torrent.info_hash(),
            self.routing_table.clone(),
            query,
        ));
        let task = launcher.clone().spawn(self.config.dht_interval());
        (launcher, task)
    }

    /// Starts discovery for a torrent. Adding a torrent twice returns the
    /// session already registered.
    pub fn add_torrent(&self, session: TorrentSession) -> Arc<TorrentSession> {
        let info_hash = *session.info_hash();
        // The swarm slot stays locked until the swarm is in place, so
        // concurrent adds of one torrent start a single set of tasks.
        let slot = match self.swarms.entry(info_hash) {
            Entry::Occupied(existing) => {
                debug!(%info_hash, "torrent already managed");
                return existing.get().trackers.torrent().clone();
            }
            Entry::Vacant(slot) => slot,
        };

        let torrent = self.torrents.insert(session);

        let trackers = Arc::new(TrackerLauncherGroup::new(torrent.clone(), self.trackers.clone()));
        trackers.load_tracker();
        let mut tasks = vec![trackers.clone().spawn(self.config.announce_interval())];

        let dht = match self.dht() {
            Some(dht) if !torrent.is_private() => {
                let (launcher, task) = self.launch_dht(dht, &torrent);
                tasks.push(task);
                Some(launcher)
            }
            Some(_) => {
                debug!(%info_hash, "private torrent, DHT disabled");
                None
            }
            None => None,
        };

        info!(
            %info_hash,
            trackers = trackers.trackers().len(),
            dht = dht.is_some(),
            "torrent added"
        );
        slot.insert(Swarm { trackers, dht, tasks });
        torrent
    }

    /// Stops discovery for a torrent and sends `stopped` to its trackers.
    pub fn remove_torrent(&self, info_hash: &InfoHash) -> bool {
        let removed = self.torrents.remove(info_hash).is_some();
        if let Some((_, swarm)) = self.swarms.remove(info_hash) {
            swarm.stop();
        }
        if removed {
            info!(%info_hash, "torrent removed");
        }
        removed
    }

    /// Feeds a DHT node learned from a peer (BEP-5 PORT message) to the
    /// torrent's next search round, or to the routing table when the torrent
    /// has no DHT search.
    pub fn add_dht_node(&self, info_hash: &InfoHash, ip: IpAddr, port: u16) {
        match self.dht_launcher(info_hash) {
            Some(launcher) => launcher.put(ip, port),
            None => {
                self.routing_table.admit(SocketAddr::new(ip, port));
            }
        }
    }

    /// Saves the tracker list, stops every torrent and background task and
    /// shuts the µTP queue down. The tracker list save error, if any, is
    /// returned after everything else has stopped.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        let persisted = TrackerConfig::persist(&self.trackers, self.store.as_ref());
        if let Err(e) = &persisted {
            warn!("failed to persist trackers on shutdown: {}", e);
        }

        let info_hashes: Vec<InfoHash> = self.swarms.iter().map(|swarm| *swarm.key()).collect();
        for info_hash in info_hashes {
            if let Some((_, swarm)) = self.swarms.remove(&info_hash) {
                swarm.stop();
            }
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.dht.write().take();
        self.utp.shutdown();

        info!("client context shut down");
        persisted.map(|_| ()).map_err(ClientError::from)
    }
}
