use super::error::TrackerError;
use super::response::{AnnounceRequest, AnnounceResponse, ScrapeFile, ScrapeResponse};
use crate::bencode::{decode, Value};
use crate::codec::{decode_peers_ipv4, decode_peers_ipv6, url_encode};
use crate::constants::{HTTP_TRACKER_TIMEOUT, USER_AGENT};
use crate::torrent::InfoHash;
use reqwest::Client;
use std::net::SocketAddr;

pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TRACKER_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let url = announce_url(&self.url, request);
        let response = self.client.get(&url).send().await?;
        let bytes = response.bytes().await?;

        parse_announce(&bytes)
    }

    pub async fn scrape(&self, info_hashes: &[InfoHash]) -> Result<ScrapeResponse, TrackerError> {
        let mut url = scrape_url(&self.url)?;
        for (i, info_hash) in info_hashes.iter().enumerate() {
            url.push(if i == 0 && !url.contains('?') { '?' } else { '&' });
            url.push_str("info_hash=");
            url.push_str(&url_encode(info_hash.as_bytes()));
        }

        let response = self.client.get(&url).send().await?;
        let bytes = response.bytes().await?;

        parse_scrape(&bytes)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub(crate) fn announce_url(base: &str, request: &AnnounceRequest) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1&numwant={}",
        base,
        separator,
        url_encode(request.info_hash.as_bytes()),
        url_encode(&request.peer_id),
        request.port,
        request.uploaded,
        request.downloaded,
        request.left,
        request.num_want,
    );

    let event_str = request.event.as_str();
    if !event_str.is_empty() {
        url.push_str(&format!("&event={}", event_str));
    }

    url
}

/// BEP-48: the last path segment must start with `announce`, which is
/// replaced by `scrape`.
pub(crate) fn scrape_url(announce: &str) -> Result<String, TrackerError> {
    let (path, query) = match announce.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (announce, None),
    };

    let slash = path
        .rfind('/')
        .ok_or_else(|| TrackerError::ScrapeNotSupported(announce.to_string()))?;
    let segment = &path[slash + 1..];
    let rest = segment
        .strip_prefix("announce")
        .ok_or_else(|| TrackerError::ScrapeNotSupported(announce.to_string()))?;

    let mut url = format!("{}scrape{}", &path[..=slash], rest);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}

pub(crate) fn parse_announce(bytes: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let value = decode(bytes)?;
    if value.as_dict().is_none() {
        return Err(TrackerError::InvalidResponse("expected dict".into()));
    }

    if let Some(failure) = value.get_str(b"failure reason") {
        return Err(TrackerError::Failure(failure.to_string()));
    }

    let interval = value
        .get_int::<u32>(b"interval")
        .ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?;

    let mut response = AnnounceResponse::new(interval);
    response.min_interval = value.get_int(b"min interval");
    response.complete = value.get_int(b"complete");
    response.incomplete = value.get_int(b"incomplete");
    response.warning_message = value.get_str(b"warning message").map(String::from);
    response.tracker_id = value.get_str(b"tracker id").map(String::from);

    let peers = value.get(b"peers").map(decode_peers_ipv4).unwrap_or_default();
    let peers6 = value.get(b"peers6").map(decode_peers_ipv6).unwrap_or_default();
    response.peers = peers
        .into_iter()
        .chain(peers6)
        .map(|(ip, port)| SocketAddr::new(ip, port))
        .collect();

    Ok(response)
}

pub(crate) fn parse_scrape(bytes: &[u8]) -> Result<ScrapeResponse, TrackerError> {
    let value = decode(bytes)?;

    if let Some(failure) = value.get_str(b"failure reason") {
        return Err(TrackerError::Failure(failure.to_string()));
    }

    let files = value
        .get(b"files")
        .and_then(Value::as_dict)
        .ok_or_else(|| TrackerError::InvalidResponse("missing files".into()))?;

    let files = files
        .iter()
        .filter_map(|(key, stats)| {
            let info_hash = InfoHash::from_bytes(key).ok()?;
            Some(ScrapeFile {
                info_hash,
                complete: stats.get_int(b"complete").unwrap_or(0),
                incomplete: stats.get_int(b"incomplete").unwrap_or(0),
                downloaded: stats.get_int(b"downloaded").unwrap_or(0),
            })
        })
        .collect();

    Ok(ScrapeResponse { files })
}
