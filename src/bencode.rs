//! Bencode values ([BEP-3]).
//!
//! Every wire format this crate touches beyond fixed-width binary frames is
//! bencoded: HTTP tracker responses, KRPC datagrams, BEP-10 extension
//! handshakes and peer-exchange payloads.
//!
//! ```
//! use rswarm::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d4:porti6881e2:ip9:127.0.0.1e").unwrap();
//! assert_eq!(value.get(b"port").and_then(Value::as_integer), Some(6881));
//! assert_eq!(encode(&value), b"d2:ip9:127.0.0.14:porti6881ee");
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::{DictBuilder, Value};

#[cfg(test)]
mod tests;
