use super::error::DhtError;
use crate::constants::{DHT_MAX_FAILURES, DHT_NODE_STALE};
use crate::torrent::InfoHash;
use rand::Rng as _;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Size of a compact IPv4 node info: id, address, port.
pub const COMPACT_NODE_LEN: usize = 26;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        let id: [u8; 20] = bytes.try_into().map_err(|_| DhtError::InvalidNodeId)?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        let mut dist = [0u8; 20];
        for (i, d) in dist.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        dist
    }

    /// Index of the first differing bit, 0 for the farthest half of the
    /// id space. Identical ids land in the last bucket.
    pub fn bucket_index(&self, other: &NodeId) -> usize {
        let dist = self.distance(other);

        for (i, &byte) in dist.iter().enumerate() {
            if byte != 0 {
                let leading = byte.leading_zeros() as usize;
                return i * 8 + leading;
            }
        }

        159
    }
}

impl From<InfoHash> for NodeId {
    fn from(info_hash: InfoHash) -> Self {
        Self(*info_hash.as_bytes())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// What we know about one remote DHT node.
///
/// A session starts out with only an address (a peer told us its DHT port,
/// or another node listed it) and becomes verified once the node answers
/// one of our queries.
#[derive(Debug, Clone)]
pub struct NodeSession {
    pub id: Option<NodeId>,
    pub addr: SocketAddr,
    pub verified: bool,
    pub last_seen: Instant,
    pub failures: u32,
}

impl NodeSession {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            id: None,
            addr,
            verified: false,
            last_seen: Instant::now(),
            failures: 0,
        }
    }

    pub fn with_id(id: NodeId, addr: SocketAddr) -> Self {
        Self {
            id: Some(id),
            ..Self::new(addr)
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.failures = 0;
    }

    pub fn fail(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Verified, no outstanding failures and heard from recently.
    pub fn mark_verify(&self) -> bool {
        self.verified && self.failures == 0 && self.last_seen.elapsed() < DHT_NODE_STALE
    }

    pub fn is_bad(&self) -> bool {
        self.failures >= DHT_MAX_FAILURES
    }

    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_NODE_LEN {
            return None;
        }

        let id = NodeId::from_bytes(&data[..20]).ok()?;
        let ip = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let port = u16::from_be_bytes([data[24], data[25]]);

        Some(Self::with_id(id, SocketAddr::new(IpAddr::V4(ip), port)))
    }

    pub fn to_compact(&self) -> Option<[u8; COMPACT_NODE_LEN]> {
        let id = self.id?;
        let mut compact = [0u8; COMPACT_NODE_LEN];
        compact[..20].copy_from_slice(&id.0);

        match self.addr {
            SocketAddr::V4(v4) => {
                compact[20..24].copy_from_slice(&v4.ip().octets());
                compact[24..26].copy_from_slice(&v4.port().to_be_bytes());
                Some(compact)
            }
            SocketAddr::V6(_) => None,
        }
    }
}
