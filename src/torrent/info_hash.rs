use std::fmt;
use std::str::FromStr;

use super::error::TorrentError;

pub const INFO_HASH_LEN: usize = 20;

/// The 20-byte SHA-1 identifier of a torrent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    pub const fn new(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TorrentError> {
        let bytes: [u8; INFO_HASH_LEN] = bytes
            .try_into()
            .map_err(|_| TorrentError::InvalidInfoHashLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, TorrentError> {
        if s.len() != INFO_HASH_LEN * 2 {
            return Err(TorrentError::InvalidInfoHashLength(s.len() / 2));
        }
        let bytes = hex::decode(s).map_err(|_| TorrentError::InvalidInfoHashHex(s.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
