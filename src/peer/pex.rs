//! Peer exchange (BEP-11) message bodies.

use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::error::PeerError;
use crate::bencode::{decode, encode, DictBuilder, Value};
use crate::codec::{encode_compact_ipv4, encode_compact_ipv6, IPV4_PEER_LEN, IPV6_PEER_LEN};

/// Per-peer flag byte of the `added.f` / `added6.f` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PexFlags(u8);

impl PexFlags {
    pub const ENCRYPTION: PexFlags = PexFlags(0x01);
    pub const SEED: PexFlags = PexFlags(0x02);
    pub const UTP: PexFlags = PexFlags(0x04);
    pub const HOLEPUNCH: PexFlags = PexFlags(0x08);
    pub const CONNECTABLE: PexFlags = PexFlags(0x10);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: PexFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: PexFlags) -> Self {
        Self(self.0 | other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PexPeer {
    pub addr: SocketAddr,
    pub flags: PexFlags,
}

impl PexPeer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            flags: PexFlags::default(),
        }
    }

    pub fn with_flags(addr: SocketAddr, flags: PexFlags) -> Self {
        Self { addr, flags }
    }
}

/// Peers added to and dropped from the sender's swarm view, both families
/// mixed; the wire split into `added`/`added6` happens in [`encode`](Self::encode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PexMessage {
    pub added: Vec<PexPeer>,
    pub dropped: Vec<SocketAddr>,
}

impl PexMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }

    pub fn added_addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.added.iter().map(|peer| peer.addr)
    }

    pub fn encode(&self) -> Bytes {
        let (added4, added6): (Vec<&PexPeer>, Vec<&PexPeer>) =
            self.added.iter().partition(|peer| peer.addr.is_ipv4());

        let dict = DictBuilder::new()
            .entry("added", encode_compact_ipv4(added4.iter().map(|peer| &peer.addr)))
            .entry("added.f", flag_bytes(&added4))
            .entry("added6", encode_compact_ipv6(added6.iter().map(|peer| &peer.addr)))
            .entry("added6.f", flag_bytes(&added6))
            .entry("dropped", encode_compact_ipv4(&self.dropped))
            .entry("dropped6", encode_compact_ipv6(&self.dropped))
            .build();

        Bytes::from(encode(&dict))
    }

    /// Missing keys read as empty lists; trailing partial records are dropped.
    pub fn decode(body: &[u8]) -> Result<Self, PeerError> {
        let value = decode(body)?;
        if value.as_dict().is_none() {
            return Err(PeerError::InvalidMessage("pex body is not a dictionary".into()));
        }

        let mut added = decode_peers(&value, "added", IPV4_PEER_LEN);
        added.extend(decode_peers(&value, "added6", IPV6_PEER_LEN));

        let mut dropped = addrs(bytes_of(&value, "dropped"), IPV4_PEER_LEN);
        dropped.extend(addrs(bytes_of(&value, "dropped6"), IPV6_PEER_LEN));

        Ok(Self { added, dropped })
    }
}

fn flag_bytes(peers: &[&PexPeer]) -> Bytes {
    peers.iter().map(|peer| peer.flags.bits()).collect::<Vec<u8>>().into()
}

fn bytes_of<'a>(value: &'a Value, key: &str) -> &'a [u8] {
    value.get_bytes(key.as_bytes()).map(|b| &b[..]).unwrap_or_default()
}

fn decode_peers(value: &Value, key: &str, record_len: usize) -> Vec<PexPeer> {
    let flags = bytes_of(value, &format!("{key}.f"));
    addrs(bytes_of(value, key), record_len)
        .into_iter()
        .enumerate()
        .map(|(i, addr)| {
            let flags = flags.get(i).copied().map(PexFlags::from_bits).unwrap_or_default();
            PexPeer::with_flags(addr, flags)
        })
        .collect()
}

fn addrs(data: &[u8], record_len: usize) -> Vec<SocketAddr> {
    data.chunks_exact(record_len)
        .map(|record| {
            let (ip, port) = record.split_at(record_len - 2);
            let ip = match <[u8; 4]>::try_from(ip) {
                Ok(v4) => IpAddr::V4(Ipv4Addr::from(v4)),
                Err(_) => {
                    let mut v6 = [0u8; 16];
                    v6.copy_from_slice(ip);
                    IpAddr::V6(Ipv6Addr::from(v6))
                }
            };
            SocketAddr::new(ip, u16::from_be_bytes([port[0], port[1]]))
        })
        .collect()
}
