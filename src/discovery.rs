//! The channel every discovery source publishes peers into.
//!
//! Trackers, the DHT, local service discovery and peer exchange all find
//! candidate addresses for a torrent; the swarm manager subscribes once and
//! decides which ones to dial.

use std::io;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::PEER_SINK_CAPACITY;
use crate::torrent::InfoHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerSource {
    Tracker,
    Dht,
    Lsd,
    Pex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub info_hash: InfoHash,
    pub addr: SocketAddr,
    pub source: PeerSource,
}

#[derive(Debug, Clone)]
pub struct PeerSink {
    tx: broadcast::Sender<DiscoveredPeer>,
}

impl PeerSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PEER_SINK_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.tx.subscribe()
    }

    /// Publishes a peer. Having no subscriber is not an error.
    pub fn publish(&self, info_hash: InfoHash, addr: SocketAddr, source: PeerSource) {
        trace!(%info_hash, %addr, ?source, "discovered peer");
        let _ = self.tx.send(DiscoveredPeer {
            info_hash,
            addr,
            source,
        });
    }

    pub fn publish_all(
        &self,
        info_hash: InfoHash,
        addrs: impl IntoIterator<Item = SocketAddr>,
        source: PeerSource,
    ) -> usize {
        addrs
            .into_iter()
            .map(|addr| self.publish(info_hash, addr, source))
            .count()
    }
}

impl Default for PeerSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive errors a UDP socket keeps working after, such as the ICMP
/// unreachable reports some platforms surface on the next `recv_from`.
pub(crate) fn is_transient_recv_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
