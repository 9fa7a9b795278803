use super::*;
use crate::discovery::{PeerSink, PeerSource};
use crate::torrent::{InfoHash, TorrentOrigin, TorrentSession};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FakeTracker {
    responses: Mutex<VecDeque<Result<AnnounceResponse, TrackerError>>>,
    requests: Mutex<Vec<AnnounceRequest>>,
    fail_all: bool,
}

impl FakeTracker {
    fn events(&self) -> Vec<TrackerEvent> {
        self.requests.lock().iter().map(|r| r.event).collect()
    }
}

impl TrackerProtocol for FakeTracker {
    fn announce(&self, request: AnnounceRequest) -> BoxFuture<'_, Result<AnnounceResponse, TrackerError>> {
        self.requests.lock().push(request);
        let result = if self.fail_all {
            Err(TrackerError::Timeout)
        } else {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(AnnounceResponse::new(1800)))
        };
        Box::pin(async move { result })
    }

    fn scrape(&self, info_hashes: Vec<InfoHash>) -> BoxFuture<'_, Result<ScrapeResponse, TrackerError>> {
        let files = info_hashes
            .into_iter()
            .map(|info_hash| ScrapeFile {
                info_hash,
                complete: 3,
                incomplete: 4,
                downloaded: 5,
            })
            .collect();
        Box::pin(async move { Ok(ScrapeResponse { files }) })
    }
}

type Registry = Arc<Mutex<HashMap<String, Arc<FakeTracker>>>>;

fn fake_context() -> (Arc<TrackerContext>, Registry, PeerSink) {
    let registry: Registry = Arc::default();
    let created = registry.clone();
    let connector: TrackerConnector = Arc::new(move |url: &str| {
        if !url.starts_with("http://") && !url.starts_with("udp://") {
            return Err(TrackerError::UnsupportedProtocol(url.to_string()));
        }
        let tracker = Arc::new(FakeTracker::default());
        created.lock().insert(url.to_string(), tracker.clone());
        Ok(tracker as Arc<dyn TrackerProtocol>)
    });

    let sink = PeerSink::new();
    let context = Arc::new(TrackerContext::new(connector, sink.clone(), [7u8; 20], 6881));
    (context, registry, sink)
}

fn failing_session(id: u64, url: &str) -> Arc<TrackerSession> {
    Arc::new(TrackerSession::new(
        id,
        url,
        Arc::new(FakeTracker {
            fail_all: true,
            ..Default::default()
        }),
    ))
}

fn torrent(origin: TorrentOrigin, private: bool) -> Arc<TorrentSession> {
    Arc::new(TorrentSession::new(InfoHash::new([0xAA; 20]), origin).with_private(private))
}

fn urls(sessions: &[Arc<TrackerSession>]) -> Vec<&str> {
    sessions.iter().map(|s| s.announce_url()).collect()
}

fn request(event: TrackerEvent) -> AnnounceRequest {
    AnnounceRequest {
        info_hash: InfoHash::new([0x01; 20]),
        peer_id: *b"-RS0001-abcdefghijkl",
        port: 6881,
        uploaded: 1,
        downloaded: 2,
        left: 3,
        event,
        num_want: 50,
    }
}

#[test]
fn test_tracker_event() {
    assert_eq!(TrackerEvent::Started.as_str(), "started");
    assert_eq!(TrackerEvent::Stopped.as_str(), "stopped");
    assert_eq!(TrackerEvent::Completed.as_str(), "completed");
    assert_eq!(TrackerEvent::None.as_str(), "");

    assert_eq!(TrackerEvent::None.as_udp_id(), 0);
    assert_eq!(TrackerEvent::Completed.as_udp_id(), 1);
    assert_eq!(TrackerEvent::Started.as_udp_id(), 2);
    assert_eq!(TrackerEvent::Stopped.as_udp_id(), 3);
}

#[test]
fn test_http_announce_url() {
    let url = http::announce_url("http://t.example/announce", &request(TrackerEvent::Started));
    assert!(url.starts_with("http://t.example/announce?info_hash=%01%01"));
    assert!(url.contains("&peer_id=-RS0001-abcdefghijkl&"));
    assert!(url.contains("&compact=1"));
    assert!(url.ends_with("&event=started"));

    let url = http::announce_url("http://t.example/announce?key=x", &request(TrackerEvent::None));
    assert!(url.starts_with("http://t.example/announce?key=x&info_hash="));
    assert!(!url.contains("event="));
}

#[test]
fn test_http_scrape_url() {
    assert_eq!(
        http::scrape_url("http://t.example/announce").unwrap(),
        "http://t.example/scrape"
    );
    assert_eq!(
        http::scrape_url("http://t.example/x/announce.php?k=1").unwrap(),
        "http://t.example/x/scrape.php?k=1"
    );
    assert!(matches!(
        http::scrape_url("http://t.example/a"),
        Err(TrackerError::ScrapeNotSupported(_))
    ));
}

#[test]
fn test_http_parse_announce_compact() {
    let mut body = b"d8:completei10e10:incompletei5e8:intervali1800e5:peers12:".to_vec();
    body.extend_from_slice(&[192, 168, 1, 1, 0x1A, 0xE1, 10, 0, 0, 1, 0x1A, 0xE2]);
    body.extend_from_slice(b"6:peers618:");
    body.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0x1A, 0xE1]);
    body.push(b'e');

    let response = http::parse_announce(&body).unwrap();
    assert_eq!(response.interval, 1800);
    assert_eq!(response.complete, Some(10));
    assert_eq!(response.incomplete, Some(5));
    assert_eq!(response.peers.len(), 3);
    assert!(response.peers.contains(&"192.168.1.1:6881".parse().unwrap()));
    assert!(response.peers.contains(&"10.0.0.1:6882".parse().unwrap()));
    assert!(response.peers.contains(&"[::1]:6881".parse().unwrap()));
}

#[test]
fn test_http_parse_announce_peer_list() {
    let body = b"d8:intervali900e5:peersld2:ip9:127.0.0.14:porti6881eed4:porti1eeee";
    let response = http::parse_announce(body).unwrap();
    assert_eq!(response.interval, 900);
    assert_eq!(response.peers, vec!["127.0.0.1:6881".parse::<SocketAddr>().unwrap()]);
}

#[test]
fn test_http_parse_announce_errors() {
    let failure = http::parse_announce(b"d14:failure reason9:not founde");
    assert!(matches!(failure, Err(TrackerError::Failure(ref m)) if m == "not found"));

    let missing = http::parse_announce(b"d5:peers0:e");
    assert!(matches!(missing, Err(TrackerError::InvalidResponse(_))));

    let not_dict = http::parse_announce(b"i42e");
    assert!(matches!(not_dict, Err(TrackerError::InvalidResponse(_))));
}

#[test]
fn test_http_parse_scrape() {
    let mut body = b"d5:filesd20:".to_vec();
    body.extend_from_slice(&[0xAB; 20]);
    body.extend_from_slice(b"d8:completei3e10:downloadedi9e10:incompletei4eeee");

    let response = http::parse_scrape(&body).unwrap();
    let file = response.get(&InfoHash::new([0xAB; 20])).unwrap();
    assert_eq!(file.complete, 3);
    assert_eq!(file.incomplete, 4);
    assert_eq!(file.downloaded, 9);
}

#[test]
fn test_udp_url() {
    assert_eq!(
        udp::parse_udp_url("udp://tracker.example.org:1337/announce").unwrap(),
        "tracker.example.org:1337"
    );
    assert_eq!(udp::parse_udp_url("udp://[::1]:6969").unwrap(), "[::1]:6969");
    assert!(udp::parse_udp_url("udp://tracker.example.org/announce").is_err());
    assert!(udp::parse_udp_url("http://tracker.example.org:80").is_err());
}

#[test]
fn test_udp_announce_request_layout() {
    let packet = udp::announce_request(0x1122, 7, 9, &request(TrackerEvent::Started));
    assert_eq!(packet.len(), 98);
    assert_eq!(&packet[0..8], &0x1122u64.to_be_bytes());
    assert_eq!(&packet[8..12], &1u32.to_be_bytes());
    assert_eq!(&packet[12..16], &7u32.to_be_bytes());
    assert_eq!(&packet[16..36], &[0x01; 20]);
    assert_eq!(&packet[80..84], &2u32.to_be_bytes());
    assert_eq!(&packet[96..98], &6881u16.to_be_bytes());
}

#[test]
fn test_udp_parse_responses() {
    let mut connect = Vec::new();
    connect.extend_from_slice(&0u32.to_be_bytes());
    connect.extend_from_slice(&5u32.to_be_bytes());
    connect.extend_from_slice(&0xDEADu64.to_be_bytes());
    assert_eq!(udp::parse_connect_response(&connect, 5).unwrap(), 0xDEAD);
    assert!(udp::parse_connect_response(&connect, 6).is_err());

    let mut announce = Vec::new();
    announce.extend_from_slice(&1u32.to_be_bytes());
    announce.extend_from_slice(&5u32.to_be_bytes());
    announce.extend_from_slice(&1800u32.to_be_bytes());
    announce.extend_from_slice(&4u32.to_be_bytes());
    announce.extend_from_slice(&9u32.to_be_bytes());
    announce.extend_from_slice(&[10, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 2]);

    let response = udp::parse_announce_response(&announce, 5, false).unwrap();
    assert_eq!(response.interval, 1800);
    assert_eq!(response.incomplete, Some(4));
    assert_eq!(response.complete, Some(9));
    assert_eq!(response.peers, vec!["10.0.0.1:6881".parse::<SocketAddr>().unwrap()]);

    let mut error = Vec::new();
    error.extend_from_slice(&3u32.to_be_bytes());
    error.extend_from_slice(&5u32.to_be_bytes());
    error.extend_from_slice(b"torrent not registered");
    assert!(matches!(
        udp::parse_announce_response(&error, 5, false),
        Err(TrackerError::Failure(ref m)) if m == "torrent not registered"
    ));

    let hashes = [InfoHash::new([1; 20]), InfoHash::new([2; 20])];
    let mut scrape = Vec::new();
    scrape.extend_from_slice(&2u32.to_be_bytes());
    scrape.extend_from_slice(&5u32.to_be_bytes());
    for n in [10u32, 20, 30, 11, 21, 31] {
        scrape.extend_from_slice(&n.to_be_bytes());
    }
    let response = udp::parse_scrape_response(&scrape, 5, &hashes).unwrap();
    assert_eq!(response.files.len(), 2);
    let second = response.get(&hashes[1]).unwrap();
    assert_eq!((second.complete, second.downloaded, second.incomplete), (11, 21, 31));
}

#[test]
fn test_connect_dispatches_on_scheme() {
    assert!(connect("http://t.example/announce").is_ok());
    assert!(connect("https://t.example/announce").is_ok());
    assert!(connect("udp://t.example:6969/announce").is_ok());
    assert!(matches!(
        connect("wss://t.example/announce"),
        Err(TrackerError::UnsupportedProtocol(_))
    ));
    assert!(HttpTracker::new("ftp://tracker.example.com").is_err());
}

#[test]
fn test_session_availability() {
    let session = failing_session(1, "http://a.example/announce");
    assert!(session.available());

    assert_eq!(session.record_failure(), 1);
    assert_eq!(session.record_failure(), 2);
    assert!(session.available());

    assert_eq!(session.record_failure(), 3);
    assert!(!session.available());

    session.record_failure();
    assert!(!session.available());
}

#[test]
fn test_session_ranking() {
    let a = failing_session(1, "http://a.example/announce");
    let b = failing_session(2, "http://b.example/announce");
    let c = failing_session(3, "http://c.example/announce");
    a.record_failure();
    a.record_failure();
    c.record_failure();

    let mut sessions = vec![a.clone(), b.clone(), c.clone()];
    sessions.sort();
    assert_eq!(urls(&sessions), vec![b.announce_url(), c.announce_url(), a.announce_url()]);

    let d = failing_session(4, "http://d.example/announce");
    assert!(b < d);
}

#[test]
fn test_context_reuses_sessions() {
    let (context, registry, _) = fake_context();

    let first = context.session("http://a.example/announce").unwrap();
    let second = context.session(" http://a.example/announce ").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(context.len(), 1);
    assert_eq!(registry.lock().len(), 1);

    assert!(context.session("").is_none());
    assert!(context.session("magnet:?xt=urn:btih:x").is_none());
    assert_eq!(context.len(), 1);

    let next = context.session("udp://b.example:80").unwrap();
    assert!(next.id() > first.id());
}

#[test]
fn test_private_torrent_never_gets_defaults() {
    let (context, _, _) = fake_context();
    context.set_defaults(vec!["http://default.example/announce".into()]);

    let own = vec!["http://own2.example/announce".to_string()];
    let private = context.sessions_for_torrent(Some("http://own1.example/announce"), &own, true);
    assert_eq!(
        urls(&private),
        vec!["http://own1.example/announce", "http://own2.example/announce"]
    );

    let public = context.sessions_for_torrent(Some("http://own1.example/announce"), &own, false);
    assert_eq!(
        urls(&public),
        vec![
            "http://own1.example/announce",
            "http://own2.example/announce",
            "http://default.example/announce",
        ]
    );
}

#[test]
fn test_sessions_for_origin() {
    let (context, _, _) = fake_context();
    context.set_defaults(vec![
        "http://default.example/announce".into(),
        "http://magnet.example/announce".into(),
    ]);

    let magnet = torrent(
        TorrentOrigin::Magnet {
            trackers: vec!["http://magnet.example/announce".into()],
        },
        false,
    );
    assert_eq!(
        urls(&context.sessions_for(&magnet)),
        vec!["http://magnet.example/announce", "http://default.example/announce"]
    );

    let other = torrent(TorrentOrigin::Other, false);
    assert_eq!(context.sessions_for(&other).len(), 2);

    let private = torrent(
        TorrentOrigin::Torrent {
            announce: None,
            announce_list: vec!["udp://p.example:6969/announce".into()],
        },
        true,
    );
    assert_eq!(
        urls(&context.sessions_for(&private)),
        vec!["udp://p.example:6969/announce"]
    );
    assert_eq!(context.sessions().len(), 3);
}

#[test]
fn test_persist_caps_and_ranks() {
    let (context, _, _) = fake_context();
    for i in 0..600 {
        context.session(&format!("http://t{}.example/announce", i));
    }

    let sessions = context.sessions();
    let dead = sessions.iter().find(|s| s.id() == 1).unwrap();
    for _ in 0..3 {
        dead.record_failure();
    }
    let flaky = sessions.iter().find(|s| s.id() == 2).unwrap();
    flaky.record_failure();
    flaky.record_failure();

    let store = MemoryTrackerStore::new();
    let written = TrackerConfig::persist(&context, &store).unwrap();
    assert_eq!(written, 512);

    let saved = store.load().unwrap();
    assert_eq!(saved.len(), 512);
    assert_eq!(saved.keys().next().map(String::as_str), Some("0001"));
    assert_eq!(saved.keys().last().map(String::as_str), Some("0512"));
    assert!(!saved.values().any(|url| url == dead.announce_url()));

    // Clean trackers in discovery order come first.
    assert_eq!(saved["0001"], "http://t2.example/announce");
}

#[test]
fn test_persist_keeps_two_failures() {
    let (context, _, _) = fake_context();
    let kept = context.session("http://kept.example/announce").unwrap();
    let dropped = context.session("http://dropped.example/announce").unwrap();
    kept.record_failure();
    kept.record_failure();
    for _ in 0..3 {
        dropped.record_failure();
    }

    let store = MemoryTrackerStore::new();
    TrackerConfig::persist(&context, &store).unwrap();

    let saved = store.load().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved["0001"], "http://kept.example/announce");
}

#[test]
fn test_persist_while_failures_change() {
    let (context, _, _) = fake_context();
    for i in 0..200 {
        context.session(&format!("http://t{}.example/announce", i));
    }
    let sessions = context.sessions();

    let failing = std::thread::spawn(move || {
        for _ in 0..2 {
            for session in sessions.iter().rev() {
                session.record_failure();
            }
        }
    });

    let store = MemoryTrackerStore::new();
    for _ in 0..20 {
        let written = TrackerConfig::persist(&context, &store).unwrap();
        assert_eq!(written, 200);
    }
    failing.join().unwrap();

    let saved = store.load().unwrap();
    assert_eq!(saved.len(), 200);
}

#[test]
fn test_config_load_skips_empty() {
    let mut entries = BTreeMap::new();
    entries.insert("0001".to_string(), "http://a.example/announce".to_string());
    entries.insert("0002".to_string(), "  ".to_string());
    entries.insert("0003".to_string(), "udp://b.example:80".to_string());

    let config = TrackerConfig::load(&MemoryTrackerStore::with_entries(entries)).unwrap();
    assert_eq!(
        config.announces(),
        &["http://a.example/announce".to_string(), "udp://b.example:80".to_string()]
    );
}

#[test]
fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTrackerStore::new(dir.path().join("state").join("trackers.toml"));
    assert!(store.load().unwrap().is_empty());

    let mut entries = BTreeMap::new();
    entries.insert("0001".to_string(), "http://a.example/announce".to_string());
    entries.insert("0002".to_string(), "udp://b.example:80/announce".to_string());
    store.save(&entries).unwrap();

    assert_eq!(store.load().unwrap(), entries);
    let config = TrackerConfig::load(&store).unwrap();
    assert_eq!(config.announces().len(), 2);
}

#[test]
fn test_file_store_skips_malformed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trackers.toml");
    std::fs::write(
        &path,
        "0001 = \"http://a.example/announce\"\n0002 = 5\n0003 = [\"x\"]\n0004 = \"\"\n",
    )
    .unwrap();

    let store = FileTrackerStore::new(&path);
    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 2);

    let config = TrackerConfig::load(&store).unwrap();
    assert_eq!(config.announces(), &["http://a.example/announce".to_string()]);
}

#[test]
fn test_file_store_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trackers.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    let result = FileTrackerStore::new(&path).load();
    assert!(matches!(result, Err(TrackerError::Store(_))));
}

#[tokio::test]
async fn test_launcher_events_and_peers() {
    let (context, registry, sink) = fake_context();
    let mut rx = sink.subscribe();

    let session = context.session("http://a.example/announce").unwrap();
    let fake = registry.lock()["http://a.example/announce"].clone();
    let mut response = AnnounceResponse::new(900);
    response.complete = Some(2);
    response.peers = vec!["10.0.0.1:6881".parse().unwrap()];
    fake.responses.lock().push_back(Ok(response));

    let launcher = context.build_launcher(session, torrent(TorrentOrigin::Other, false));
    assert!(launcher.last_result().is_none());

    launcher.find_peer().await;
    launcher.find_peer().await;
    assert_eq!(fake.events(), vec![TrackerEvent::Started, TrackerEvent::None]);
    assert_eq!(fake.requests.lock()[0].peer_id, [7u8; 20]);

    let peer = rx.recv().await.unwrap();
    assert_eq!(peer.addr, "10.0.0.1:6881".parse::<SocketAddr>().unwrap());
    assert_eq!(peer.source, PeerSource::Tracker);
    assert_eq!(peer.info_hash, InfoHash::new([0xAA; 20]));

    let last = launcher.last_result().unwrap();
    assert_eq!(last.interval, Duration::from_secs(1800));

    launcher.release().await;
    assert_eq!(fake.events().last(), Some(&TrackerEvent::Stopped));

    launcher.find_peer().await;
    assert_eq!(fake.requests.lock().len(), 3);
}

#[tokio::test]
async fn test_launcher_failures_disable_tracker() {
    let session = failing_session(1, "http://dead.example/announce");
    let launcher = TrackerLauncher::new(
        session.clone(),
        torrent(TorrentOrigin::Other, false),
        PeerSink::new(),
        [0u8; 20],
        6881,
    );

    for _ in 0..5 {
        launcher.find_peer().await;
    }
    assert_eq!(session.fail_count(), 3);
    assert!(!session.available());
    assert!(launcher.last_result().is_none());

    // Never announced, so nothing to stop.
    launcher.release().await;
    assert_eq!(session.fail_count(), 3);
}

#[tokio::test]
async fn test_launcher_scrape() {
    let (context, _, _) = fake_context();
    let session = context.session("http://a.example/announce").unwrap();
    let launcher = context.build_launcher(session, torrent(TorrentOrigin::Other, false));

    let file = launcher.scrape().await.unwrap().unwrap();
    assert_eq!(file.info_hash, InfoHash::new([0xAA; 20]));
    assert_eq!(file.complete, 3);
}

#[tokio::test]
async fn test_group_lifecycle() {
    let (context, registry, _) = fake_context();
    context.set_defaults(vec!["http://default.example/announce".into()]);

    let group = TrackerLauncherGroup::new(
        torrent(
            TorrentOrigin::Torrent {
                announce: Some("http://own.example/announce".into()),
                announce_list: vec!["ftp://bad.example".into()],
            },
            false,
        ),
        context.clone(),
    );
    assert!(group.trackers().is_empty());

    group.load_tracker();
    assert_eq!(
        group.trackers(),
        vec!["http://own.example/announce", "http://default.example/announce"]
    );

    group.find_peer().await;
    let own = registry.lock()["http://own.example/announce"].clone();
    let default = registry.lock()["http://default.example/announce"].clone();
    assert_eq!(own.events(), vec![TrackerEvent::Started]);
    assert_eq!(default.events(), vec![TrackerEvent::Started]);

    group.release();
    assert!(group.trackers().is_empty());

    tokio::time::timeout(Duration::from_secs(5), async {
        while own.events().len() < 2 || default.events().len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(own.events().last(), Some(&TrackerEvent::Stopped));

    // The sessions outlive the group.
    assert_eq!(context.len(), 2);
}
