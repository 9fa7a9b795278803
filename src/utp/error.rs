use thiserror::Error;

#[derive(Debug, Error)]
pub enum UtpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request queue is shut down")]
    QueueClosed,

    #[error("request failed: {0}")]
    Failed(String),
}
