//! Tracker protocol (BEP-3, BEP-15, BEP-23, BEP-48)
//!
//! [`HttpTracker`] and [`UdpTracker`] speak the wire protocols behind the
//! [`TrackerProtocol`] trait. [`TrackerContext`] keeps one
//! [`TrackerSession`] per announce URL for the whole client and counts its
//! failures; a [`TrackerLauncherGroup`] announces one torrent to all of its
//! trackers. [`TrackerConfig`] loads and persists the default tracker list.

mod context;
mod error;
mod http;
mod launcher;
mod protocol;
mod response;
mod session;
mod store;
mod udp;

pub use context::TrackerContext;
pub use error::TrackerError;
pub use http::HttpTracker;
pub use launcher::{AnnounceResult, TrackerLauncher, TrackerLauncherGroup, TransferStats};
pub use protocol::{connect, default_connector, TrackerConnector, TrackerProtocol};
pub use response::{AnnounceRequest, AnnounceResponse, ScrapeFile, ScrapeResponse, TrackerEvent};
pub use session::TrackerSession;
pub use store::{FileTrackerStore, MemoryTrackerStore, TrackerConfig, TrackerStore};
pub use udp::UdpTracker;

#[cfg(test)]
mod tests;
