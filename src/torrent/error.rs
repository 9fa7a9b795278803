use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TorrentError {
    /// Info hashes are exactly 20 bytes (40 hex characters).
    #[error("invalid info hash length: {0}")]
    InvalidInfoHashLength(usize),

    #[error("invalid info hash hex: {0}")]
    InvalidInfoHashHex(String),
}
