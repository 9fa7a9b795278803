use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::warn;

use super::protocol::TrackerProtocol;
use crate::constants::MAX_FAIL_TIMES;

/// A tracker known to the client, shared by every torrent that uses it.
///
/// Sessions rank by failure count, then by the order in which they were
/// discovered.
pub struct TrackerSession {
    id: u64,
    announce_url: String,
    protocol: Arc<dyn TrackerProtocol>,
    failures: AtomicU32,
}

impl TrackerSession {
    pub fn new(id: u64, announce_url: impl Into<String>, protocol: Arc<dyn TrackerProtocol>) -> Self {
        Self {
            id,
            announce_url: announce_url.into(),
            protocol,
            failures: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn announce_url(&self) -> &str {
        &self.announce_url
    }

    pub fn protocol(&self) -> &Arc<dyn TrackerProtocol> {
        &self.protocol
    }

    pub fn fail_count(&self) -> u32 {
        self.failures.load(AtomicOrdering::Relaxed)
    }

    /// Below [`MAX_FAIL_TIMES`] failures. Once unavailable a session never
    /// comes back.
    pub fn available(&self) -> bool {
        self.fail_count() < MAX_FAIL_TIMES
    }

    /// Returns the new failure count.
    pub fn record_failure(&self) -> u32 {
        let count = self
            .failures
            .fetch_add(1, AtomicOrdering::Relaxed)
            .saturating_add(1);
        if count == MAX_FAIL_TIMES {
            warn!(
                tracker = %self.announce_url,
                "tracker failed {} times, no longer used", count
            );
        }
        count
    }

    fn rank(&self) -> (u32, u64) {
        (self.fail_count(), self.id)
    }
}

impl fmt::Debug for TrackerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSession")
            .field("id", &self.id)
            .field("announce_url", &self.announce_url)
            .field("failures", &self.fail_count())
            .finish()
    }
}

impl PartialEq for TrackerSession {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for TrackerSession {}

impl PartialOrd for TrackerSession {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackerSession {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}
