//! Local Service Discovery ([BEP-14]).
//!
//! Finds peers on the local network by multicasting `BT-SEARCH` announces
//! for every public torrent and listening for the announces of others.
//!
//! LSD uses UDP multicast on port 6771, preferring the IPv4 group:
//! - IPv4: `239.192.152.143:6771`
//! - IPv6: `[ff15::efc0:988f]:6771`
//!
//! # Examples
//!
//! ```no_run
//! use rswarm::discovery::PeerSink;
//! use rswarm::lsd::LsdService;
//! use rswarm::torrent::TorrentContext;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let torrents = Arc::new(TorrentContext::new());
//! let sink = PeerSink::new();
//! let mut peers = sink.subscribe();
//!
//! let lsd = Arc::new(LsdService::bind(6881, torrents, sink).await?);
//! let _task = lsd.start(Duration::from_secs(300));
//!
//! while let Ok(peer) = peers.recv().await {
//!     println!("local peer {} for {}", peer.addr, peer.info_hash);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [BEP-14]: http://bittorrent.org/beps/bep_0014.html

mod error;
mod message;
mod service;

pub use error::LsdError;
pub use message::LsdAnnounce;
pub use service::LsdService;
