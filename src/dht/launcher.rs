use super::client::PeerQuery;
use super::node::NodeId;
use super::routing::RoutingTable;
use crate::constants::DHT_K;
use crate::torrent::InfoHash;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Periodic DHT peer search for one torrent.
///
/// Each round asks the verified nodes nearest to the info hash, the nearest
/// nodes still waiting to answer for the first time, and every node address
/// reported since the last round (for example through a peer's PORT
/// message), for peers. An answer promotes an unverified node into the
/// routing table; silence counts against it until it is dropped.
pub struct DhtLauncher {
    info_hash: InfoHash,
    routing_table: Arc<RoutingTable>,
    query: Arc<dyn PeerQuery>,
    pending: Mutex<Vec<SocketAddr>>,
}

impl DhtLauncher {
    pub fn new(
        info_hash: InfoHash,
        routing_table: Arc<RoutingTable>,
        query: Arc<dyn PeerQuery>,
    ) -> Self {
        Self {
            info_hash,
            routing_table,
            query,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    /// Queues a node address for the next round.
    pub fn put(&self, ip: IpAddr, port: u16) {
        self.pending.lock().push(SocketAddr::new(ip, port));
    }

    /// Runs one round and returns the number of queries sent.
    pub async fn run_once(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());

        let target = NodeId::from(self.info_hash);
        let mut candidates: Vec<SocketAddr> = self
            .routing_table
            .find_node(&target)
            .into_iter()
            .filter(|node| node.mark_verify())
            .map(|node| node.addr)
            .collect();
        candidates.extend(
            self.routing_table
                .find_unidentified(&target, DHT_K)
                .into_iter()
                .map(|node| node.addr),
        );

        for addr in &pending {
            self.routing_table.admit(*addr);
        }
        candidates.extend(pending);

        let mut seen = HashSet::new();
        candidates.retain(|addr| seen.insert(*addr));

        if candidates.is_empty() {
            debug!(info_hash = %self.info_hash, "no DHT nodes to query");
            return 0;
        }

        let mut sent = 0;
        for addr in candidates {
            match self.query.get_peers(addr, self.info_hash).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(info_hash = %self.info_hash, "DHT get_peers to {} failed: {}", addr, e),
            }
        }

        debug!(info_hash = %self.info_hash, "sent {} DHT get_peers queries", sent);
        sent
    }

    /// Runs [`run_once`](Self::run_once) every `interval`, first round
    /// immediately, until the handle is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
