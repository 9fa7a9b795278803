//! Protocol constants and tuning parameters.
//!
//! Ports, multicast groups, timeouts and intervals used by the discovery
//! and transport layers. Everything tunable at runtime has its default here
//! and is overridable through [`ClientConfig`](crate::config::ClientConfig).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &str = "-RS0001-";

/// User agent string for HTTP tracker requests
pub const USER_AGENT: &str = "rswarm/0.1.0";

// ============================================================================
// Ports
// ============================================================================

/// Default BitTorrent listen port
pub const DEFAULT_PORT: u16 = 6881;

/// Default DHT port
pub const DEFAULT_DHT_PORT: u16 = 6881;

/// Local Service Discovery multicast port (BEP-14)
pub const LSD_PORT: u16 = 6771;

// ============================================================================
// Multicast addresses
// ============================================================================

/// LSD IPv4 multicast group (BEP-14)
pub const LSD_MULTICAST_V4: Ipv4Addr = Ipv4Addr::new(239, 192, 152, 143);

/// LSD IPv6 multicast group, `ff15::efc0:988f` (BEP-14)
pub const LSD_MULTICAST_V6: Ipv6Addr = Ipv6Addr::new(0xff15, 0, 0, 0, 0, 0, 0xefc0, 0x988f);

// ============================================================================
// Trackers
// ============================================================================

/// A tracker that failed this many times is never announced to again
pub const MAX_FAIL_TIMES: u32 = 3;

/// Upper bound on trackers written to the tracker store
pub const MAX_TRACKER_SIZE: usize = 512;

/// Number of peers asked for in an announce
pub const DEFAULT_NUM_WANT: u32 = 50;

/// HTTP tracker request timeout
pub const HTTP_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// UDP tracker request timeout (first attempt; doubles per retry, BEP-15)
pub const UDP_TRACKER_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// UDP tracker retries before giving up
pub const UDP_TRACKER_MAX_RETRIES: u32 = 3;

/// UDP connection ids are valid for one minute (BEP-15)
pub const UDP_CONNECTION_ID_TTL: Duration = Duration::from_secs(60);

// ============================================================================
// DHT
// ============================================================================

/// Kademlia bucket size
pub const DHT_K: usize = 8;

/// Number of buckets, one per bit of a node id
pub const DHT_BUCKETS: usize = 160;

/// A node not heard from within this window is no longer considered good
pub const DHT_NODE_STALE: Duration = Duration::from_secs(15 * 60);

/// Failures after which a node is evicted
pub const DHT_MAX_FAILURES: u32 = 3;

/// A query with no answer after this long counts as a node failure
pub const DHT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Queries in flight before new ones are refused
pub const DHT_MAX_PENDING_QUERIES: usize = 1024;

/// Addresses waiting to be verified; the oldest is dropped beyond this
pub const DHT_MAX_UNIDENTIFIED: usize = 1024;

/// Largest UDP datagram accepted from the DHT
pub const DHT_MAX_PACKET: usize = 1500;

// ============================================================================
// Intervals
// ============================================================================

/// Default tracker announce interval
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default DHT get_peers round interval
pub const DEFAULT_DHT_INTERVAL: Duration = Duration::from_secs(60);

/// Default LSD announce interval (BEP-14 asks for at most one per minute per torrent)
pub const DEFAULT_LSD_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How often the tracker list is written back to the tracker store
pub const DEFAULT_TRACKER_PERSIST_INTERVAL: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Channels
// ============================================================================

/// Buffered discovered peers before slow subscribers start lagging
pub const PEER_SINK_CAPACITY: usize = 4096;

/// Outbound extension message buffer per connection
pub const EXTENSION_OUTBOUND_CAPACITY: usize = 256;
