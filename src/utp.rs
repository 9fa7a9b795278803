//! uTP request queue
//!
//! Inbound uTP packets must be handled in order per connection, but many
//! connections can progress in parallel. [`UtpRequestQueue`] spreads work
//! over a fixed set of FIFO shards, each drained by exactly one task.

mod error;
mod queue;

pub use error::UtpError;
pub use queue::{UtpRequest, UtpRequestQueue, UtpShard};
