use dashmap::DashMap;
use std::sync::Arc;

use super::info_hash::InfoHash;

/// Where a torrent was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentOrigin {
    /// A `.torrent` descriptor with its `announce` and flattened `announce-list`.
    Torrent {
        announce: Option<String>,
        announce_list: Vec<String>,
    },
    /// A magnet link with its `tr` parameters.
    Magnet { trackers: Vec<String> },
    /// Any other source; discovery falls back to the default tracker set.
    Other,
}

/// Discovery-relevant state of one managed torrent.
#[derive(Debug, Clone)]
pub struct TorrentSession {
    info_hash: InfoHash,
    origin: TorrentOrigin,
    private: bool,
    piece_count: u32,
}

impl TorrentSession {
    pub fn new(info_hash: InfoHash, origin: TorrentOrigin) -> Self {
        Self {
            info_hash,
            origin,
            private: false,
            piece_count: 0,
        }
    }

    /// Marks the torrent private (BEP-27): no DHT, no LSD, own trackers only.
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_piece_count(mut self, piece_count: u32) -> Self {
        self.piece_count = piece_count;
        self
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    pub fn origin(&self) -> &TorrentOrigin {
        &self.origin
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }
}

/// Registry of every torrent the client currently manages.
#[derive(Debug, Default)]
pub struct TorrentContext {
    torrents: DashMap<InfoHash, Arc<TorrentSession>>,
}

impl TorrentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a torrent, returning the already-registered session if the
    /// info hash is known.
    pub fn insert(&self, session: TorrentSession) -> Arc<TorrentSession> {
        self.torrents
            .entry(session.info_hash)
            .or_insert_with(|| Arc::new(session))
            .clone()
    }

    pub fn remove(&self, info_hash: &InfoHash) -> Option<Arc<TorrentSession>> {
        self.torrents.remove(info_hash).map(|(_, session)| session)
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<Arc<TorrentSession>> {
        self.torrents.get(info_hash).map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<Arc<TorrentSession>> {
        self.torrents.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }
}
