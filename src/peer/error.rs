use thiserror::Error;

use super::extension::ExtensionType;

/// Errors raised while handling peer-wire extension traffic.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Received a malformed or truncated extension message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The remote never advertised this extension in its handshake.
    #[error("extension not supported by peer: {0}")]
    ExtensionNotSupported(ExtensionType),

    /// The connection's outbound channel is gone.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),
}
