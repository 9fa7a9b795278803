//! rswarm - swarm discovery and transport core for a BitTorrent client
//!
//! Everything a client needs to find peers for its torrents and to talk the
//! discovery-related parts of the peer protocol, following the BEP
//! (BitTorrent Enhancement Proposals) specifications.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`codec`] - Compact peer lists, allowed-fast sets, tracker URL escaping
//! - [`config`] - Client configuration (TOML)
//! - [`context`] - The client context wiring every discovery source together
//! - [`dht`] - BEP-5 Distributed Hash Table routing and peer search
//! - [`discovery`] - The channel discovered peers are published to
//! - [`lsd`] - BEP-14 Local Service Discovery
//! - [`peer`] - BEP-10 extension protocol, BEP-11 peer exchange, `lt_donthave`
//! - [`torrent`] - Torrent identity and the torrent registry
//! - [`tracker`] - BEP-3/15/23/48 HTTP and UDP trackers, persisted tracker list
//! - [`utp`] - Sharded µTP request queue

pub mod bencode;
pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod dht;
pub mod discovery;
pub mod lsd;
pub mod peer;
pub mod torrent;
pub mod tracker;
pub mod utp;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::{ClientConfig, ConfigError};
pub use context::{ClientContext, ClientError};
pub use dht::{DhtClient, DhtError, DhtLauncher, NodeId, RoutingTable};
pub use discovery::{DiscoveredPeer, PeerSink, PeerSource};
pub use lsd::{LsdAnnounce, LsdError, LsdService};
pub use peer::{
    Bitfield, ExtensionHandshake, ExtensionMessage, ExtensionMessageHandler, ExtensionType,
    PeerError, PeerId, PeerSession,
};
pub use torrent::{InfoHash, TorrentContext, TorrentError, TorrentOrigin, TorrentSession};
pub use tracker::{
    AnnounceResponse, HttpTracker, ScrapeResponse, TrackerConfig, TrackerContext, TrackerError,
    TrackerEvent, TrackerLauncher, TrackerLauncherGroup, TrackerSession, UdpTracker,
};
pub use utp::{UtpError, UtpRequestQueue};
