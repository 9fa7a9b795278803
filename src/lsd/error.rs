use thiserror::Error;

#[derive(Debug, Error)]
pub enum LsdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither multicast group could be joined.
    #[error("no multicast group available: {0}")]
    Unavailable(String),

    /// Malformed announce message.
    #[error("invalid announce: {0}")]
    InvalidAnnounce(String),
}
