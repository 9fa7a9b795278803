use super::error::DhtError;
use super::message::{KrpcMessage, KrpcResponse, TransactionId};
use super::node::NodeId;
use super::routing::RoutingTable;
use crate::constants::{DHT_MAX_PACKET, DHT_MAX_PENDING_QUERIES, DHT_QUERY_TIMEOUT};
use crate::discovery::{is_transient_recv_error, PeerSink, PeerSource};
use crate::torrent::InfoHash;
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

/// Sends a `get_peers` query for an info hash to one node.
///
/// [`DhtLauncher`](super::DhtLauncher) only needs this much of the client,
/// which keeps it testable without a socket.
pub trait PeerQuery: Send + Sync {
    fn get_peers(&self, addr: SocketAddr, info_hash: InfoHash) -> BoxFuture<'_, Result<(), DhtError>>;
}

struct PendingQuery {
    addr: SocketAddr,
    info_hash: Option<InfoHash>,
    sent_at: Instant,
}

/// Owns the DHT socket.
///
/// Queries are fire-and-forget: [`run`](Self::run) matches answers to the
/// outstanding transaction, verifies the sender, publishes any `values`
/// and admits any `nodes` into the routing table. Queries left unanswered
/// for [`DHT_QUERY_TIMEOUT`] count as a failure of the node.
pub struct DhtClient {
    socket: UdpSocket,
    our_id: NodeId,
    routing_table: Arc<RoutingTable>,
    sink: PeerSink,
    pending: Mutex<HashMap<TransactionId, PendingQuery>>,
    next_tid: AtomicU16,
}

impl DhtClient {
    pub async fn bind(
        addr: SocketAddr,
        routing_table: Arc<RoutingTable>,
        sink: PeerSink,
    ) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind(addr).await?;
        let our_id = *routing_table.our_id();

        info!("DHT client bound to {} with id {}", socket.local_addr()?, our_id);

        Ok(Self {
            socket,
            our_id,
            routing_table,
            sink,
            pending: Mutex::new(HashMap::new()),
            next_tid: AtomicU16::new(rand::random()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    pub async fn ping(&self, addr: SocketAddr) -> Result<(), DhtError> {
        let tid = self.register(addr, None)?;
        let msg = KrpcMessage::ping(tid.clone(), &self.our_id);
        self.send(addr, tid, msg).await
    }

    pub async fn send_get_peers(&self, addr: SocketAddr, info_hash: InfoHash) -> Result<(), DhtError> {
        let tid = self.register(addr, Some(info_hash))?;
        let msg = KrpcMessage::get_peers(tid.clone(), &self.our_id, info_hash);
        self.send(addr, tid, msg).await
    }

    /// Receive loop. Returns only when the socket fails for good; transient
    /// receive errors are logged and skipped.
    pub async fn run(&self) -> Result<(), DhtError> {
        let mut buf = vec![0u8; DHT_MAX_PACKET];
        let mut expire_interval = tokio::time::interval(DHT_QUERY_TIMEOUT);
        expire_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        expire_interval.tick().await;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, addr)) => self.handle_datagram(&buf[..n], addr),
                        Err(e) if is_transient_recv_error(&e) => {
                            debug!("DHT receive error, continuing: {}", e);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                _ = expire_interval.tick() => {
                    self.expire_pending();
                }
            }
        }
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let response = match KrpcResponse::parse(data) {
            Ok(response) => response,
            Err(DhtError::Remote { code, message }) => {
                debug!("DHT node {} replied with error {}: {}", from, code, message);
                return;
            }
            Err(e) => {
                debug!("Failed to parse DHT message from {}: {}", from, e);
                return;
            }
        };

        let query = {
            let mut pending = self.pending.lock();
            let ours = pending
                .get(&response.transaction_id)
                .is_some_and(|query| query.addr == from);
            if ours {
                pending.remove(&response.transaction_id)
            } else {
                None
            }
        };
        let Some(query) = query else {
            trace!("Dropping DHT response from {} with unknown transaction", from);
            return;
        };

        self.routing_table.verify(from, response.sender_id);

        for node in &response.nodes {
            if let Some(id) = node.id {
                self.routing_table.admit_node(id, node.addr);
            }
        }

        if let Some(info_hash) = query.info_hash {
            if !response.values.is_empty() {
                let count = self
                    .sink
                    .publish_all(info_hash, response.values, PeerSource::Dht);
                debug!(%info_hash, "DHT node {} returned {} peers", from, count);
            }
        }
    }

    fn expire_pending(&self) {
        let expired: Vec<SocketAddr> = {
            let mut pending = self.pending.lock();
            let mut expired = Vec::new();
            pending.retain(|_, query| {
                let alive = query.sent_at.elapsed() < DHT_QUERY_TIMEOUT;
                if !alive {
                    expired.push(query.addr);
                }
                alive
            });
            expired
        };

        for addr in expired {
            trace!("DHT query to {} timed out", addr);
            self.routing_table.mark_failed(&addr);
        }
    }

    fn register(&self, addr: SocketAddr, info_hash: Option<InfoHash>) -> Result<TransactionId, DhtError> {
        let tid = Bytes::copy_from_slice(&self.next_tid.fetch_add(1, Ordering::Relaxed).to_be_bytes());

        let mut pending = self.pending.lock();
        if pending.len() >= DHT_MAX_PENDING_QUERIES {
            return Err(DhtError::RateLimited);
        }
        pending.insert(
            tid.clone(),
            PendingQuery {
                addr,
                info_hash,
                sent_at: Instant::now(),
            },
        );

        Ok(tid)
    }

    async fn send(&self, addr: SocketAddr, tid: TransactionId, msg: KrpcMessage) -> Result<(), DhtError> {
        let data = msg.encode();
        if let Err(e) = self.socket.send_to(&data, addr).await {
            self.pending.lock().remove(&tid);
            self.routing_table.mark_failed(&addr);
            return Err(e.into());
        }
        Ok(())
    }
}

impl PeerQuery for DhtClient {
    fn get_peers(&self, addr: SocketAddr, info_hash: InfoHash) -> BoxFuture<'_, Result<(), DhtError>> {
        Box::pin(self.send_get_peers(addr, info_hash))
    }
}
