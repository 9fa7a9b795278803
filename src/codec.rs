//! Stateless binary codecs shared by every protocol layer.
//!
//! - compact peer lists (BEP-23 / BEP-7) and the dictionary peer-list form
//! - the BEP-6 allowed-fast piece set
//! - byte-wise percent-encoding for tracker query parameters

mod compact;
mod fast;
mod url;

pub use compact::{
    decode_compact_ipv4, decode_compact_ipv6, decode_peer_list, decode_peers_ipv4,
    decode_peers_ipv6, encode_compact_ipv4, encode_compact_ipv6, IPV4_PEER_LEN, IPV6_PEER_LEN,
};
pub use fast::{allowed_fast, ALLOWED_FAST_SET_SIZE};
pub use url::{url_decode, url_encode};
