use std::fmt::Write as _;
use std::net::SocketAddr;

use super::error::LsdError;
use crate::torrent::InfoHash;

const SEARCH_LINE: &str = "BT-SEARCH * HTTP/1.1";

/// A `BT-SEARCH` announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsdAnnounce {
    /// The multicast group the message was addressed to. Informational only;
    /// some senders leave it out.
    pub host: Option<SocketAddr>,
    /// Listen port of the announcing client.
    pub port: u16,
    pub info_hashes: Vec<InfoHash>,
    pub cookie: Option<String>,
}

impl LsdAnnounce {
    pub fn encode(&self) -> String {
        let mut message = format!("{SEARCH_LINE}\r\n");
        if let Some(host) = &self.host {
            let _ = write!(message, "Host: {host}\r\n");
        }
        let _ = write!(message, "Port: {}\r\n", self.port);
        for info_hash in &self.info_hashes {
            let _ = write!(message, "Infohash: {}\r\n", info_hash.to_hex());
        }
        if let Some(cookie) = &self.cookie {
            let _ = write!(message, "cookie: {cookie}\r\n");
        }
        message.push_str("\r\n\r\n");
        message
    }

    /// Parses an announce. Header names are case-insensitive; malformed
    /// `Infohash` lines are skipped, but at least one must be valid. `Host`
    /// may be missing.
    pub fn parse(data: &[u8]) -> Result<Self, LsdError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| LsdError::InvalidAnnounce("not utf-8".into()))?;

        let mut lines = text.lines();
        if lines.next().map(str::trim) != Some(SEARCH_LINE) {
            return Err(LsdError::InvalidAnnounce("not a BT-SEARCH message".into()));
        }

        let mut host = None;
        let mut port = None;
        let mut info_hashes = Vec::new();
        let mut cookie = None;

        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "host" => host = value.parse().ok(),
                "port" => port = value.parse().ok(),
                "infohash" => {
                    if let Ok(info_hash) = InfoHash::from_hex(value) {
                        info_hashes.push(info_hash);
                    }
                }
                "cookie" => cookie = Some(value.to_string()),
                _ => {}
            }
        }

        let port = port.ok_or_else(|| LsdError::InvalidAnnounce("missing port".into()))?;
        if info_hashes.is_empty() {
            return Err(LsdError::InvalidAnnounce("missing infohash".into()));
        }

        Ok(Self {
            host,
            port,
            info_hashes,
            cookie,
        })
    }
}
