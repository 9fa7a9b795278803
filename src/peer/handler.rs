use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::error::PeerError;
use super::extension::{
    frame, ExtensionHandshake, ExtensionMessage, ExtensionType, EXTENSION_HANDSHAKE_ID,
};
use super::session::PeerSession;
use crate::constants::{EXTENSION_OUTBOUND_CAPACITY, USER_AGENT};
use crate::discovery::{PeerSink, PeerSource};
use crate::torrent::TorrentSession;

/// Channel carrying framed peer wire messages to the connection writer.
pub fn outbound_channel() -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
    mpsc::channel(EXTENSION_OUTBOUND_CAPACITY)
}

/// Per-connection BEP-10 multiplexer.
///
/// Inbound extended messages arrive tagged with the ids from *our*
/// handshake; outbound ones are tagged with the ids from the *remote's*.
pub struct ExtensionMessageHandler {
    peer: Arc<PeerSession>,
    torrent: Arc<TorrentSession>,
    sink: PeerSink,
    outbound: mpsc::Sender<Bytes>,
    remote: RwLock<ExtensionHandshake>,
}

impl ExtensionMessageHandler {
    pub fn new(
        peer: Arc<PeerSession>,
        torrent: Arc<TorrentSession>,
        sink: PeerSink,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            peer,
            torrent,
            sink,
            outbound,
            remote: RwLock::new(ExtensionHandshake::default()),
        }
    }

    pub fn peer(&self) -> &Arc<PeerSession> {
        &self.peer
    }

    /// Our handshake. Private torrents do not offer peer exchange.
    pub fn handshake(&self) -> ExtensionHandshake {
        let private = self.torrent.is_private();
        let mut handshake = ExtensionHandshake::with_extensions(
            ExtensionType::ALL
                .into_iter()
                .filter(|ext| !(private && *ext == ExtensionType::UtPex)),
        );
        handshake.client = Some(USER_AGENT.to_string());
        handshake
    }

    pub async fn send_handshake(&self) -> Result<(), PeerError> {
        let body = self.handshake().encode();
        self.send_frame(frame(EXTENSION_HANDSHAKE_ID, &body)).await
    }

    /// Records the remote's extension ids and capabilities.
    pub fn on_handshake(&self, handshake: ExtensionHandshake) {
        debug!(
            peer = %self.peer.addr(),
            client = handshake.client.as_deref().unwrap_or("unknown"),
            "extension handshake: {:?}", handshake.extensions
        );
        self.peer.set_extensions(handshake.supported());
        self.peer.set_upload_only(handshake.upload_only);
        *self.remote.write() = handshake;
    }

    /// Handles the payload of one extended message, `[ext-id][body]`.
    pub fn on_message(&self, payload: &[u8]) -> Result<(), PeerError> {
        let Some((&id, body)) = payload.split_first() else {
            return Err(PeerError::InvalidMessage("empty extended message".into()));
        };

        if id == EXTENSION_HANDSHAKE_ID {
            self.on_handshake(ExtensionHandshake::decode(body)?);
            return Ok(());
        }

        let Some(ext) = ExtensionType::from_local_id(id) else {
            debug!(peer = %self.peer.addr(), id, "ignoring unknown extension id");
            return Ok(());
        };

        if body.len() < ext.min_len() {
            return Err(PeerError::InvalidMessage(format!(
                "{} message too short: {} < {}",
                ext,
                body.len(),
                ext.min_len()
            )));
        }

        match ExtensionMessage::decode(ext, body)? {
            Some(message) => self.apply(message),
            None => debug!(peer = %self.peer.addr(), "no handler for {}", ext),
        }
        Ok(())
    }

    fn apply(&self, message: ExtensionMessage) {
        match message {
            ExtensionMessage::DontHave { piece } => {
                trace!(peer = %self.peer.addr(), piece, "dont_have");
                self.peer.piece_off(piece);
            }
            ExtensionMessage::Pex(pex) => {
                if self.torrent.is_private() {
                    debug!(peer = %self.peer.addr(), "ignoring pex for private torrent");
                    return;
                }
                let count = self.sink.publish_all(
                    *self.torrent.info_hash(),
                    pex.added_addrs(),
                    PeerSource::Pex,
                );
                trace!(peer = %self.peer.addr(), "pex added {} peers", count);
            }
            ExtensionMessage::UploadOnly(upload_only) => {
                self.peer.set_upload_only(upload_only);
            }
        }
    }

    /// Sends `body` tagged with the remote's id for `ext`.
    pub async fn push(&self, ext: ExtensionType, body: &[u8]) -> Result<(), PeerError> {
        let id = self.remote.read().extension_id(ext);
        let Some(id) = id else {
            return Err(PeerError::ExtensionNotSupported(ext));
        };
        self.send_frame(frame(id, body)).await
    }

    pub async fn send(&self, message: &ExtensionMessage) -> Result<(), PeerError> {
        self.push(message.extension_type(), &message.encode()).await
    }

    pub fn dont_have_extension(&self) -> DontHaveExtension<'_> {
        DontHaveExtension { handler: self }
    }

    async fn send_frame(&self, frame: Bytes) -> Result<(), PeerError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| PeerError::ConnectionClosed)
    }
}

/// Outbound side of `lt_donthave`.
pub struct DontHaveExtension<'a> {
    handler: &'a ExtensionMessageHandler,
}

impl DontHaveExtension<'_> {
    /// Tells the peer we no longer have `index`.
    pub async fn dont_have(&self, index: u32) -> Result<(), PeerError> {
        debug!(peer = %self.handler.peer.addr(), index, "sending dont_have");
        self.handler
            .send(&ExtensionMessage::DontHave { piece: index })
            .await
    }
}
