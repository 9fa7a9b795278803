//! Peer-wire extension layer (BEP-10).
//!
//! The connection itself lives elsewhere; this module keeps per-peer state
//! and multiplexes extended messages: `lt_donthave`, `ut_pex` and
//! `upload_only` are decoded and applied, the remaining extensions are only
//! advertised.

mod bitfield;
mod error;
mod extension;
mod handler;
mod peer_id;
mod pex;
mod session;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use extension::{
    frame, ExtensionHandshake, ExtensionMessage, ExtensionType, EXTENDED_MESSAGE_ID,
    EXTENSION_HANDSHAKE_ID,
};
pub use handler::{outbound_channel, DontHaveExtension, ExtensionMessageHandler};
pub use peer_id::PeerId;
pub use pex::{PexFlags, PexMessage, PexPeer};
pub use session::PeerSession;
