use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::bitfield::Bitfield;
use super::extension::ExtensionType;

/// What we know about one connected peer: its pieces and the extensions it
/// speaks.
#[derive(Debug)]
pub struct PeerSession {
    addr: SocketAddr,
    bitfield: Mutex<Bitfield>,
    extensions: RwLock<HashSet<ExtensionType>>,
    upload_only: AtomicBool,
}

impl PeerSession {
    pub fn new(addr: SocketAddr, piece_count: u32) -> Self {
        Self {
            addr,
            bitfield: Mutex::new(Bitfield::new(piece_count)),
            extensions: RwLock::new(HashSet::new()),
            upload_only: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn piece_on(&self, index: u32) {
        if !self.bitfield.lock().set_piece(index) {
            debug!(peer = %self.addr, index, "have for out-of-range piece");
        }
    }

    pub fn piece_off(&self, index: u32) {
        if !self.bitfield.lock().clear_piece(index) {
            debug!(peer = %self.addr, index, "dont_have for out-of-range piece");
        }
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.lock().has_piece(index)
    }

    pub fn bitfield(&self) -> Bitfield {
        self.bitfield.lock().clone()
    }

    /// Replaces the piece set, e.g. from a wire `bitfield` message.
    pub fn set_bitfield(&self, bitfield: Bitfield) {
        *self.bitfield.lock() = bitfield;
    }

    pub fn supports(&self, ext: ExtensionType) -> bool {
        self.extensions.read().contains(&ext)
    }

    pub fn set_extensions(&self, extensions: impl IntoIterator<Item = ExtensionType>) {
        *self.extensions.write() = extensions.into_iter().collect();
    }

    pub fn is_upload_only(&self) -> bool {
        self.upload_only.load(Ordering::Relaxed)
    }

    pub fn set_upload_only(&self, upload_only: bool) {
        self.upload_only.store(upload_only, Ordering::Relaxed);
    }
}
