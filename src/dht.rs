//! Distributed Hash Table (BEP-5)
//!
//! Trackerless peer discovery. [`RoutingTable`] keeps the Kademlia view of
//! the network, [`DhtClient`] owns the UDP socket and turns `get_peers`
//! answers into discovered peers, and one [`DhtLauncher`] per torrent
//! periodically asks the nodes nearest to its info hash.

mod client;
mod error;
mod launcher;
mod message;
mod node;
mod routing;

pub use client::{DhtClient, PeerQuery};
pub use error::DhtError;
pub use launcher::DhtLauncher;
pub use message::{DhtQuery, KrpcMessage, KrpcResponse, TransactionId};
pub use node::{NodeId, NodeSession, COMPACT_NODE_LEN};
pub use routing::RoutingTable;

#[cfg(test)]
mod tests;
