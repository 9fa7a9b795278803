use std::net::SocketAddr;
use std::time::Instant;

use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout;

use super::error::TrackerError;
use super::response::{AnnounceRequest, AnnounceResponse, ScrapeFile, ScrapeResponse};
use crate::codec::{decode_compact_ipv4, decode_compact_ipv6};
use crate::constants::{UDP_CONNECTION_ID_TTL, UDP_TRACKER_MAX_RETRIES, UDP_TRACKER_REQUEST_TIMEOUT};
use crate::torrent::InfoHash;

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_SCRAPE: u32 = 2;
const ACTION_ERROR: u32 = 3;

#[derive(Default)]
struct UdpState {
    socket: Option<UdpSocket>,
    connection: Option<(u64, Instant)>,
}

/// BEP-15 tracker client.
///
/// The socket is bound and the connection id obtained on first use; the id
/// is refreshed once it is older than a minute. Requests are serialized
/// over the one socket.
pub struct UdpTracker {
    url: String,
    host: String,
    state: TokioMutex<UdpState>,
}

impl UdpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        let host = parse_udp_url(url)?;
        Ok(Self {
            url: url.to_string(),
            host,
            state: TokioMutex::new(UdpState::default()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let mut state = self.state.lock().await;
        let connection_id = self.ensure_connected(&mut state).await?;
        let socket = state
            .socket
            .as_ref()
            .ok_or_else(|| TrackerError::InvalidResponse("not connected".into()))?;

        let transaction_id: u32 = rand::rng().random();
        let key: u32 = rand::rng().random();
        let packet = announce_request(connection_id, transaction_id, key, request);

        let response = send_and_receive(socket, &packet, 8).await?;
        let ipv6 = matches!(socket.peer_addr(), Ok(SocketAddr::V6(_)));
        parse_announce_response(&response, transaction_id, ipv6)
    }

    pub async fn scrape(&self, info_hashes: &[InfoHash]) -> Result<ScrapeResponse, TrackerError> {
        let mut state = self.state.lock().await;
        let connection_id = self.ensure_connected(&mut state).await?;
        let socket = state
            .socket
            .as_ref()
            .ok_or_else(|| TrackerError::InvalidResponse("not connected".into()))?;

        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(16 + info_hashes.len() * 20);
        request.extend_from_slice(&connection_id.to_be_bytes());
        request.extend_from_slice(&ACTION_SCRAPE.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());
        for info_hash in info_hashes {
            request.extend_from_slice(info_hash.as_bytes());
        }

        let response = send_and_receive(socket, &request, 8).await?;
        parse_scrape_response(&response, transaction_id, info_hashes)
    }

    async fn ensure_connected(&self, state: &mut UdpState) -> Result<u64, TrackerError> {
        if let Some((id, obtained)) = state.connection {
            if obtained.elapsed() < UDP_CONNECTION_ID_TTL {
                return Ok(id);
            }
        }

        if state.socket.is_none() {
            let addr = tokio::net::lookup_host(&self.host)
                .await?
                .next()
                .ok_or_else(|| TrackerError::InvalidUrl(self.url.clone()))?;
            let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(bind).await?;
            socket.connect(addr).await?;
            state.socket = Some(socket);
        }

        let socket = state
            .socket
            .as_ref()
            .ok_or_else(|| TrackerError::InvalidResponse("not connected".into()))?;

        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(16);
        request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
        request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());

        let response = send_and_receive(socket, &request, 16).await?;
        let id = parse_connect_response(&response, transaction_id)?;
        state.connection = Some((id, Instant::now()));

        Ok(id)
    }
}

async fn send_and_receive(
    socket: &UdpSocket,
    request: &[u8],
    min_response_size: usize,
) -> Result<Vec<u8>, TrackerError> {
    let mut buf = vec![0u8; 2048];

    for attempt in 0..UDP_TRACKER_MAX_RETRIES {
        socket.send(request).await?;

        let timeout_duration = UDP_TRACKER_REQUEST_TIMEOUT * (1 << attempt);

        match timeout(timeout_duration, socket.recv(&mut buf)).await {
            Ok(Ok(n)) if n >= min_response_size => {
                return Ok(buf[..n].to_vec());
            }
            Ok(Ok(_)) => {
                return Err(TrackerError::InvalidResponse("response too short".into()));
            }
            Ok(Err(e)) => return Err(TrackerError::Io(e)),
            Err(_) => continue,
        }
    }

    Err(TrackerError::Timeout)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Action and transaction id, surfacing error packets.
fn check_header(response: &[u8], action: u32, transaction_id: u32) -> Result<(), TrackerError> {
    if response.len() < 8 {
        return Err(TrackerError::InvalidResponse("response too short".into()));
    }
    let resp_action = read_u32(response, 0);
    let resp_tid = read_u32(response, 4);

    if resp_tid != transaction_id {
        return Err(TrackerError::InvalidResponse("transaction id mismatch".into()));
    }
    if resp_action == ACTION_ERROR {
        let message = String::from_utf8_lossy(&response[8..]).to_string();
        return Err(TrackerError::Failure(message));
    }
    if resp_action != action {
        return Err(TrackerError::InvalidResponse(format!(
            "unexpected action {}",
            resp_action
        )));
    }
    Ok(())
}

pub(crate) fn parse_connect_response(response: &[u8], transaction_id: u32) -> Result<u64, TrackerError> {
    check_header(response, ACTION_CONNECT, transaction_id)?;
    let id: [u8; 8] = response
        .get(8..16)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| TrackerError::InvalidResponse("connect response too short".into()))?;
    Ok(u64::from_be_bytes(id))
}

pub(crate) fn announce_request(
    connection_id: u64,
    transaction_id: u32,
    key: u32,
    request: &AnnounceRequest,
) -> Vec<u8> {
    let mut packet = Vec::with_capacity(98);
    packet.extend_from_slice(&connection_id.to_be_bytes());
    packet.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
    packet.extend_from_slice(&transaction_id.to_be_bytes());
    packet.extend_from_slice(request.info_hash.as_bytes());
    packet.extend_from_slice(&request.peer_id);
    packet.extend_from_slice(&request.downloaded.to_be_bytes());
    packet.extend_from_slice(&request.left.to_be_bytes());
    packet.extend_from_slice(&request.uploaded.to_be_bytes());
    packet.extend_from_slice(&request.event.as_udp_id().to_be_bytes());
    packet.extend_from_slice(&0u32.to_be_bytes()); // IP address (0 = default)
    packet.extend_from_slice(&key.to_be_bytes());
    packet.extend_from_slice(&request.num_want.to_be_bytes());
    packet.extend_from_slice(&request.port.to_be_bytes());
    packet
}

pub(crate) fn parse_announce_response(
    response: &[u8],
    transaction_id: u32,
    ipv6: bool,
) -> Result<AnnounceResponse, TrackerError> {
    check_header(response, ACTION_ANNOUNCE, transaction_id)?;
    if response.len() < 20 {
        return Err(TrackerError::InvalidResponse("announce response too short".into()));
    }

    let mut result = AnnounceResponse::new(read_u32(response, 8));
    result.incomplete = Some(read_u32(response, 12));
    result.complete = Some(read_u32(response, 16));

    let peers = if ipv6 {
        decode_compact_ipv6(&response[20..])
    } else {
        decode_compact_ipv4(&response[20..])
    };
    result.peers = peers
        .into_iter()
        .map(|(ip, port)| SocketAddr::new(ip, port))
        .collect();

    Ok(result)
}

pub(crate) fn parse_scrape_response(
    response: &[u8],
    transaction_id: u32,
    info_hashes: &[InfoHash],
) -> Result<ScrapeResponse, TrackerError> {
    check_header(response, ACTION_SCRAPE, transaction_id)?;

    let files = response[8..]
        .chunks_exact(12)
        .zip(info_hashes)
        .map(|(chunk, info_hash)| ScrapeFile {
            info_hash: *info_hash,
            complete: read_u32(chunk, 0),
            downloaded: read_u32(chunk, 4),
            incomplete: read_u32(chunk, 8),
        })
        .collect();

    Ok(ScrapeResponse { files })
}

/// `udp://host:port/announce` to `host:port`.
pub(crate) fn parse_udp_url(url: &str) -> Result<String, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let host = rest.split(['/', '?']).next().unwrap_or(rest);

    // A bracketed IPv6 literal carries colons of its own.
    let has_port = match host.rfind(']') {
        Some(end) => host[end..].contains(':'),
        None => host.contains(':'),
    };
    if host.is_empty() || !has_port {
        return Err(TrackerError::InvalidUrl(url.to_string()));
    }

    Ok(host.to_string())
}
