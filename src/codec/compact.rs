use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::debug;

use crate::bencode::Value;

/// 4-byte address + 2-byte big-endian port.
pub const IPV4_PEER_LEN: usize = 6;
/// 16-byte address + 2-byte big-endian port.
pub const IPV6_PEER_LEN: usize = 18;

/// Decodes compact IPv4 peers. A trailing partial record is dropped.
pub fn decode_compact_ipv4(data: &[u8]) -> HashMap<IpAddr, u16> {
    data.chunks_exact(IPV4_PEER_LEN)
        .map(|record| {
            let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
            let port = u16::from_be_bytes([record[4], record[5]]);
            (IpAddr::V4(ip), port)
        })
        .collect()
}

/// Decodes compact IPv6 peers. A trailing partial record is dropped.
pub fn decode_compact_ipv6(data: &[u8]) -> HashMap<IpAddr, u16> {
    data.chunks_exact(IPV6_PEER_LEN)
        .map(|record| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&record[..16]);
            let port = u16::from_be_bytes([record[16], record[17]]);
            (IpAddr::V6(Ipv6Addr::from(octets)), port)
        })
        .collect()
}

/// Decodes the dictionary form `[{ip: "..", port: N}, ..]`.
///
/// Entries without a parseable `ip` or an in-range `port` are skipped.
pub fn decode_peer_list(list: &[Value]) -> HashMap<IpAddr, u16> {
    list.iter()
        .filter_map(|entry| {
            let ip = entry.get_str(b"ip").and_then(|s| s.parse().ok());
            let port = entry.get_int::<u16>(b"port");
            match (ip, port) {
                (Some(ip), Some(port)) => Some((ip, port)),
                _ => {
                    debug!("skipping malformed peer entry: {:?}", entry);
                    None
                }
            }
        })
        .collect()
}

/// Decodes an IPv4 `peers` value of either shape.
pub fn decode_peers_ipv4(value: &Value) -> HashMap<IpAddr, u16> {
    decode_peers(value, decode_compact_ipv4)
}

/// Decodes an IPv6 `peers6` value of either shape.
pub fn decode_peers_ipv6(value: &Value) -> HashMap<IpAddr, u16> {
    decode_peers(value, decode_compact_ipv6)
}

fn decode_peers(value: &Value, compact: fn(&[u8]) -> HashMap<IpAddr, u16>) -> HashMap<IpAddr, u16> {
    match value {
        Value::Bytes(bytes) => compact(bytes),
        Value::List(list) => decode_peer_list(list),
        other => {
            debug!("unsupported peer list shape: {:?}", other);
            HashMap::new()
        }
    }
}

/// Encodes the IPv4 members of `addrs` in compact form; IPv6 members are skipped.
pub fn encode_compact_ipv4<'a>(addrs: impl IntoIterator<Item = &'a SocketAddr>) -> Bytes {
    let mut buf = BytesMut::new();
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            buf.put_slice(&v4.ip().octets());
            buf.put_u16(v4.port());
        }
    }
    buf.freeze()
}

/// Encodes the IPv6 members of `addrs` in compact form; IPv4 members are skipped.
pub fn encode_compact_ipv6<'a>(addrs: impl IntoIterator<Item = &'a SocketAddr>) -> Bytes {
    let mut buf = BytesMut::new();
    for addr in addrs {
        if let SocketAddr::V6(v6) = addr {
            buf.put_slice(&v6.ip().octets());
            buf.put_u16(v6.port());
        }
    }
    buf.freeze()
}
