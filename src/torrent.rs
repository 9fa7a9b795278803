//! Torrent identity and the registry of managed torrents.
//!
//! Parsing `.torrent` files and magnet URIs happens upstream; this module only
//! keeps what discovery needs: the info hash, where the torrent came from (which
//! decides its tracker set) and whether it is private.

mod error;
mod info_hash;
mod session;

pub use error::TorrentError;
pub use info_hash::{InfoHash, INFO_HASH_LEN};
pub use session::{TorrentContext, TorrentOrigin, TorrentSession};
