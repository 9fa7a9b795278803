use super::*;
use crate::constants::DHT_MAX_UNIDENTIFIED;
use crate::bencode::{decode, encode, DictBuilder, Value};
use crate::discovery::{PeerSink, PeerSource};
use crate::torrent::InfoHash;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

fn addr(last: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
}

fn id_with_prefix(first: u8) -> NodeId {
    let mut bytes = [0u8; 20];
    bytes[0] = first;
    NodeId(bytes)
}

#[test]
fn test_node_id_generate() {
    let id1 = NodeId::generate();
    let id2 = NodeId::generate();
    assert_ne!(id1.0, id2.0);
}

#[test]
fn test_node_id_from_bytes_invalid() {
    assert!(NodeId::from_bytes(&[1u8; 10]).is_err());
    assert!(NodeId::from_bytes(&[1u8; 21]).is_err());
    assert_eq!(NodeId::from_bytes(&[1u8; 20]).unwrap().0, [1u8; 20]);
}

#[test]
fn test_node_id_bucket_index() {
    let id1 = NodeId([0u8; 20]);
    assert_eq!(id1.bucket_index(&id_with_prefix(0x80)), 0);
    assert_eq!(id1.bucket_index(&id_with_prefix(0x01)), 7);
    assert_eq!(id1.bucket_index(&id1), 159);
}

#[test]
fn test_node_compact() {
    let node = NodeSession::with_id(NodeId([1u8; 20]), addr(1, 6881));

    let compact = node.to_compact().unwrap();
    let parsed = NodeSession::from_compact(&compact).unwrap();
    assert_eq!(parsed.id, node.id);
    assert_eq!(parsed.addr, node.addr);
    assert!(!parsed.verified);

    assert!(NodeSession::new(addr(1, 6881)).to_compact().is_none());
    assert!(NodeSession::from_compact(&compact[..25]).is_none());
}

#[test]
fn test_node_mark_verify() {
    let mut node = NodeSession::with_id(NodeId::generate(), addr(1, 6881));
    assert!(!node.mark_verify());

    node.verified = true;
    assert!(node.mark_verify());

    node.fail();
    assert!(!node.mark_verify());
    assert!(!node.is_bad());

    node.touch();
    assert!(node.mark_verify());

    node.fail();
    node.fail();
    node.fail();
    assert!(node.is_bad());
}

#[test]
fn test_routing_admit_is_idempotent() {
    let table = RoutingTable::new(NodeId([0u8; 20]));

    let first = table.admit(addr(1, 6881));
    let second = table.admit(addr(1, 6881));

    assert_eq!(first.addr, second.addr);
    assert!(first.id.is_none());
    assert!(!first.verified);
    assert_eq!(table.len(), 1);
    assert_eq!(table.node_count(), 0);
}

#[test]
fn test_routing_verify_promotes() {
    let table = RoutingTable::new(NodeId([0u8; 20]));
    let id = id_with_prefix(0x10);

    table.admit(addr(1, 6881));
    table.verify(addr(1, 6881), id);

    assert_eq!(table.len(), 1);
    assert_eq!(table.node_count(), 1);

    let node = table.admit(addr(1, 6881));
    assert_eq!(node.id, Some(id));
    assert!(node.mark_verify());

    let found = table.find_node(&id);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].addr, addr(1, 6881));
}

#[test]
fn test_routing_ignores_own_id() {
    let our_id = NodeId([7u8; 20]);
    let table = RoutingTable::new(our_id);

    table.verify(addr(1, 6881), our_id);
    table.admit_node(our_id, addr(2, 6881));

    assert!(table.is_empty());
}

#[test]
fn test_routing_find_node_orders_by_distance() {
    let table = RoutingTable::new(NodeId([0u8; 20]));

    for i in 1..=20u8 {
        table.verify(addr(i, 6881), id_with_prefix(i));
    }

    let target = id_with_prefix(0x03);
    let closest = table.find_node(&target);
    assert_eq!(closest.len(), 8);
    assert_eq!(closest[0].id, Some(target));

    let distances: Vec<_> = closest
        .iter()
        .map(|n| n.id.unwrap().distance(&target))
        .collect();
    let mut sorted = distances.clone();
    sorted.sort();
    assert_eq!(distances, sorted);
}

#[test]
fn test_routing_find_node_skips_unidentified() {
    let table = RoutingTable::new(NodeId([0u8; 20]));
    table.admit(addr(1, 6881));
    table.admit_node(id_with_prefix(0x22), addr(2, 6881));

    assert!(table.find_node(&id_with_prefix(0x22)).is_empty());
    assert_eq!(table.len(), 2);
}

#[test]
fn test_routing_pool_is_capped() {
    let table = RoutingTable::new(NodeId([0u8; 20]));
    let total = DHT_MAX_UNIDENTIFIED + 500;
    for i in 0..total {
        let ip = Ipv4Addr::from(0x0a00_0000 + i as u32);
        table.admit_node(id_with_prefix(0x40), SocketAddr::new(IpAddr::V4(ip), 6881));
    }

    assert_eq!(table.len(), DHT_MAX_UNIDENTIFIED);
    // The oldest addresses went first.
    let first = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(0x0a00_0000)), 6881);
    let last = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + total as u32 - 1)), 6881);
    assert!(table.get(&first).is_none());
    assert!(table.get(&last).is_some());

    // Promoting a node frees its pool slot.
    table.verify(last, id_with_prefix(0x41));
    assert_eq!(table.len(), DHT_MAX_UNIDENTIFIED);
    assert_eq!(table.node_count(), 1);
}

#[test]
fn test_routing_find_unidentified() {
    let table = RoutingTable::new(NodeId([0u8; 20]));
    table.admit(addr(1, 6881));
    table.admit_node(id_with_prefix(0x90), addr(2, 6881));
    table.admit_node(id_with_prefix(0x81), addr(3, 6881));
    table.verify(addr(4, 6881), id_with_prefix(0x80));

    let found = table.find_unidentified(&id_with_prefix(0x80), 8);
    let addrs: Vec<SocketAddr> = found.iter().map(|node| node.addr).collect();
    assert_eq!(addrs, vec![addr(3, 6881), addr(2, 6881), addr(1, 6881)]);

    assert_eq!(table.find_unidentified(&id_with_prefix(0x80), 1).len(), 1);
}

#[test]
fn test_routing_eviction_after_failures() {
    let table = RoutingTable::new(NodeId([0u8; 20]));
    table.verify(addr(1, 6881), id_with_prefix(0x10));

    table.mark_failed(&addr(1, 6881));
    table.mark_failed(&addr(1, 6881));
    assert_eq!(table.node_count(), 1);
    assert!(!table.get(&addr(1, 6881)).unwrap().mark_verify());

    table.mark_failed(&addr(1, 6881));
    assert_eq!(table.node_count(), 0);
    assert!(table.get(&addr(1, 6881)).is_none());
}

#[test]
fn test_routing_replacement_cache() {
    let table = RoutingTable::new(NodeId([0u8; 20]));

    // All of these share bucket 0 (top bit set).
    for i in 0..9u8 {
        let mut id = [0u8; 20];
        id[0] = 0x80;
        id[19] = i;
        table.verify(addr(i + 1, 6881), NodeId(id));
    }
    assert_eq!(table.node_count(), 8);

    for _ in 0..3 {
        table.mark_failed(&addr(1, 6881));
    }

    assert_eq!(table.node_count(), 8);
    assert!(table.get(&addr(9, 6881)).is_some());
}

#[test]
fn test_krpc_get_peers_encoding() {
    let our_id = NodeId([0x11; 20]);
    let info_hash = InfoHash::new([0xAB; 20]);
    let tid = bytes::Bytes::from_static(b"aa");

    let encoded = KrpcMessage::get_peers(tid, &our_id, info_hash).encode();
    let value = decode(&encoded).unwrap();

    assert_eq!(value.get_bytes(b"t").unwrap().as_ref(), b"aa");
    assert_eq!(value.get_str(b"y"), Some("q"));
    assert_eq!(value.get_str(b"q"), Some("get_peers"));

    let args = value.get(b"a").unwrap();
    assert_eq!(args.get_bytes(b"id").unwrap().as_ref(), &[0x11; 20]);
    assert_eq!(args.get_bytes(b"info_hash").unwrap().as_ref(), &[0xAB; 20]);
}

#[test]
fn test_krpc_ping_encoding() {
    let encoded = KrpcMessage::ping(bytes::Bytes::from_static(b"pp"), &NodeId([1; 20])).encode();
    let value = decode(&encoded).unwrap();

    assert_eq!(value.get_str(b"q"), Some("ping"));
    assert!(value.get(b"a").unwrap().get(b"info_hash").is_none());
}

#[test]
fn test_krpc_response_parse() {
    let node = NodeSession::with_id(NodeId([0x40; 20]), addr(9, 6881));
    let response = DictBuilder::new()
        .entry("t", "xy")
        .entry("y", "r")
        .entry(
            "r",
            DictBuilder::new()
                .entry("id", &[0x22u8; 20][..])
                .entry("token", "tok")
                .entry("nodes", &node.to_compact().unwrap()[..])
                .entry(
                    "values",
                    vec![
                        Value::from(&[10u8, 0, 0, 1, 0x1A, 0xE1][..]),
                        Value::from(&[1u8, 2, 3][..]),
                    ],
                )
                .build(),
        )
        .build();

    let parsed = KrpcResponse::parse(&encode(&response)).unwrap();
    assert_eq!(parsed.transaction_id.as_ref(), b"xy");
    assert_eq!(parsed.sender_id, NodeId([0x22; 20]));
    assert_eq!(parsed.values, vec![addr(1, 6881)]);
    assert_eq!(parsed.nodes.len(), 1);
    assert_eq!(parsed.nodes[0].id, node.id);
    assert_eq!(parsed.token.as_deref(), Some(&b"tok"[..]));
}

#[test]
fn test_krpc_error_and_query_rejected() {
    let error = DictBuilder::new()
        .entry("t", "xy")
        .entry("y", "e")
        .entry("e", vec![Value::from(201i64), Value::from("Generic Error")])
        .build();
    match KrpcResponse::parse(&encode(&error)) {
        Err(DhtError::Remote { code, message }) => {
            assert_eq!(code, 201);
            assert_eq!(message, "Generic Error");
        }
        other => panic!("unexpected {:?}", other),
    }

    let query = KrpcMessage::ping(bytes::Bytes::from_static(b"aa"), &NodeId([1; 20])).encode();
    assert!(matches!(
        KrpcResponse::parse(&query),
        Err(DhtError::InvalidMessage(_))
    ));

    assert!(matches!(
        KrpcResponse::parse(b"not bencode"),
        Err(DhtError::Bencode(_))
    ));
}

#[derive(Default)]
struct RecordingQuery {
    calls: Mutex<Vec<(SocketAddr, InfoHash)>>,
    failing: Option<SocketAddr>,
}

impl PeerQuery for RecordingQuery {
    fn get_peers(&self, addr: SocketAddr, info_hash: InfoHash) -> BoxFuture<'_, Result<(), DhtError>> {
        self.calls.lock().push((addr, info_hash));
        let failing = self.failing == Some(addr);
        Box::pin(async move {
            if failing {
                Err(DhtError::Io(std::io::Error::other("unreachable")))
            } else {
                Ok(())
            }
        })
    }
}

#[tokio::test]
async fn test_launcher_empty_round() {
    let table = Arc::new(RoutingTable::new(NodeId([0u8; 20])));
    let query = Arc::new(RecordingQuery::default());
    let launcher = DhtLauncher::new(InfoHash::new([1; 20]), table, query.clone());

    assert_eq!(launcher.run_once().await, 0);
    assert!(query.calls.lock().is_empty());
}

#[tokio::test]
async fn test_launcher_unions_verified_and_pending() {
    let info_hash = InfoHash::new([0x80; 20]);
    let table = Arc::new(RoutingTable::new(NodeId([0u8; 20])));
    table.verify(addr(1, 6881), id_with_prefix(0x81));
    table.admit_node(id_with_prefix(0x82), addr(2, 6881));

    let query = Arc::new(RecordingQuery::default());
    let launcher = DhtLauncher::new(info_hash, table.clone(), query.clone());

    launcher.put(addr(3, 7000).ip(), 7000);
    launcher.put(addr(3, 7000).ip(), 7000);
    launcher.put(addr(1, 6881).ip(), 6881);

    assert_eq!(launcher.run_once().await, 3);

    let calls = query.calls.lock().clone();
    let targets: Vec<SocketAddr> = calls.iter().map(|(a, _)| *a).collect();
    assert_eq!(targets, vec![addr(1, 6881), addr(2, 6881), addr(3, 7000)]);
    assert!(calls.iter().all(|(_, h)| *h == info_hash));

    // The pending address was admitted and the buffer drained; it is now
    // asked from the pool until it answers.
    assert!(table.get(&addr(3, 7000)).is_some());
    query.calls.lock().clear();
    assert_eq!(launcher.run_once().await, 3);

    // Once it answers it is a verified node.
    table.verify(addr(3, 7000), id_with_prefix(0x83));
    assert_eq!(table.node_count(), 2);
    query.calls.lock().clear();
    assert_eq!(launcher.run_once().await, 3);
}

#[tokio::test]
async fn test_launcher_drops_silent_pool_nodes() {
    let table = Arc::new(RoutingTable::new(NodeId([0u8; 20])));
    table.admit_node(id_with_prefix(0x82), addr(2, 6881));

    let query = Arc::new(RecordingQuery::default());
    let launcher = DhtLauncher::new(InfoHash::new([0x80; 20]), table.clone(), query.clone());

    assert_eq!(launcher.run_once().await, 1);
    for _ in 0..3 {
        table.mark_failed(&addr(2, 6881));
    }
    assert!(table.get(&addr(2, 6881)).is_none());
    assert_eq!(launcher.run_once().await, 0);
}

#[tokio::test]
async fn test_launcher_swallows_query_errors() {
    let table = Arc::new(RoutingTable::new(NodeId([0u8; 20])));
    let query = Arc::new(RecordingQuery {
        failing: Some(addr(1, 6881)),
        ..Default::default()
    });
    let launcher = DhtLauncher::new(InfoHash::new([1; 20]), table, query.clone());

    launcher.put(addr(1, 6881).ip(), 6881);
    launcher.put(addr(2, 6881).ip(), 6881);

    assert_eq!(launcher.run_once().await, 1);
    assert_eq!(query.calls.lock().len(), 2);
}

#[tokio::test]
async fn test_client_publishes_values_and_admits_nodes() {
    let table = Arc::new(RoutingTable::new(NodeId([0u8; 20])));
    let sink = PeerSink::new();
    let mut rx = sink.subscribe();

    let client = Arc::new(
        DhtClient::bind("127.0.0.1:0".parse().unwrap(), table.clone(), sink)
            .await
            .unwrap(),
    );
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let runner = client.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let info_hash = InfoHash::new([0xAB; 20]);
    PeerQuery::get_peers(client.as_ref(), remote_addr, info_hash)
        .await
        .unwrap();

    let mut buf = [0u8; 1500];
    let (n, from) = remote.recv_from(&mut buf).await.unwrap();
    let query = decode(&buf[..n]).unwrap();
    assert_eq!(query.get_str(b"q"), Some("get_peers"));
    let tid = query.get_bytes(b"t").unwrap().clone();

    let remote_id = id_with_prefix(0x90);
    let other = NodeSession::with_id(id_with_prefix(0x40), addr(9, 6881));
    let response = DictBuilder::new()
        .entry("t", tid)
        .entry("y", "r")
        .entry(
            "r",
            DictBuilder::new()
                .entry("id", &remote_id.as_bytes()[..])
                .entry("nodes", &other.to_compact().unwrap()[..])
                .entry("values", vec![Value::from(&[10u8, 0, 0, 1, 0x1A, 0xE1][..])])
                .build(),
        )
        .build();
    remote.send_to(&encode(&response), from).await.unwrap();

    let peer = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peer.info_hash, info_hash);
    assert_eq!(peer.addr, addr(1, 6881));
    assert_eq!(peer.source, PeerSource::Dht);

    let node = table.get(&remote_addr).unwrap();
    assert_eq!(node.id, Some(remote_id));
    assert!(node.mark_verify());
    assert_eq!(table.get(&other.addr).unwrap().id, other.id);

    handle.abort();
}

#[test]
fn test_transient_receive_errors() {
    use crate::discovery::is_transient_recv_error;
    use std::io::{Error, ErrorKind};

    assert!(is_transient_recv_error(&Error::from(ErrorKind::ConnectionReset)));
    assert!(is_transient_recv_error(&Error::from(ErrorKind::ConnectionRefused)));
    assert!(is_transient_recv_error(&Error::from(ErrorKind::Interrupted)));
    assert!(!is_transient_recv_error(&Error::from(ErrorKind::PermissionDenied)));
    assert!(!is_transient_recv_error(&Error::other("socket closed")));
}
