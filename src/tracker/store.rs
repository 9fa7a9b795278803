use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::context::TrackerContext;
use super::error::TrackerError;
use crate::constants::MAX_TRACKER_SIZE;

/// Key/value storage for the tracker list.
pub trait TrackerStore: Send + Sync {
    fn load(&self) -> Result<BTreeMap<String, String>, TrackerError>;

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), TrackerError>;
}

#[derive(Debug, Default)]
pub struct MemoryTrackerStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl TrackerStore for MemoryTrackerStore {
    fn load(&self) -> Result<BTreeMap<String, String>, TrackerError> {
        Ok(self.entries.lock().clone())
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), TrackerError> {
        *self.entries.lock() = entries.clone();
        Ok(())
    }
}

/// A flat TOML table on disk. A missing file loads as empty.
#[derive(Debug, Clone)]
pub struct FileTrackerStore {
    path: PathBuf,
}

impl FileTrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackerStore for FileTrackerStore {
    fn load(&self) -> Result<BTreeMap<String, String>, TrackerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let table: toml::Table = toml::from_str(&content)?;

        let mut entries = BTreeMap::new();
        for (key, value) in table {
            match value {
                toml::Value::String(url) => {
                    entries.insert(key, url);
                }
                other => warn!(key = %key, kind = other.type_str(), "ignoring malformed tracker entry"),
            }
        }
        Ok(entries)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), TrackerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// The persisted default tracker list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    announces: Vec<String>,
}

impl TrackerConfig {
    /// Every non-empty value is a default announce URL, in key order.
    pub fn load(store: &dyn TrackerStore) -> Result<Self, TrackerError> {
        let entries = store.load()?;

        let mut announces = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let value = value.trim();
            if value.is_empty() {
                warn!(key = %key, "ignoring empty default tracker");
                continue;
            }
            announces.push(value.to_string());
        }

        debug!("loaded {} default trackers", announces.len());
        Ok(Self { announces })
    }

    pub fn announces(&self) -> &[String] {
        &self.announces
    }

    pub fn into_announces(self) -> Vec<String> {
        self.announces
    }

    /// Writes the best available trackers, at most [`MAX_TRACKER_SIZE`],
    /// under keys `0001`, `0002`, ... in rank order. Returns how many were
    /// written.
    pub fn persist(context: &TrackerContext, store: &dyn TrackerStore) -> Result<usize, TrackerError> {
        // Failure counts move under concurrent announces, so rank on a snapshot.
        let mut sessions: Vec<_> = context
            .sessions()
            .into_iter()
            .filter(|session| session.available())
            .map(|session| (session.fail_count(), session.id(), session))
            .collect();
        sessions.sort_by_key(|(failures, id, _)| (*failures, *id));

        let entries: BTreeMap<String, String> = sessions
            .iter()
            .take(MAX_TRACKER_SIZE)
            .enumerate()
            .map(|(i, (_, _, session))| (format!("{:04}", i + 1), session.announce_url().to_string()))
            .collect();

        store.save(&entries)?;
        debug!("saved {} trackers", entries.len());
        Ok(entries.len())
    }
}
