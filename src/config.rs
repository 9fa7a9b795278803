//! Client configuration.
//!
//! [`ClientConfig`] is read from TOML. Every key is optional; missing keys
//! take the defaults from [`constants`](crate::constants).
//!
//! ```
//! use rswarm::config::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str("dht_port = 7000\nlsd_enabled = false").unwrap();
//! assert_eq!(config.dht_port, 7000);
//! assert!(!config.lsd_enabled);
//! assert_eq!(config.listen_port, 6881);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ANNOUNCE_INTERVAL, DEFAULT_DHT_INTERVAL, DEFAULT_DHT_PORT, DEFAULT_LSD_INTERVAL,
    DEFAULT_PORT, DEFAULT_TRACKER_PERSIST_INTERVAL,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port announced to trackers, DHT nodes and LSD.
    pub listen_port: u16,
    /// Local UDP port of the DHT socket.
    pub dht_port: u16,
    pub dht_interval_secs: u64,
    pub lsd_enabled: bool,
    pub lsd_interval_secs: u64,
    /// Used until a tracker replies with its own interval.
    pub announce_interval_secs: u64,
    pub tracker_persist_interval_secs: u64,
    /// Worker count of the uTP request queue; `None` means one per core.
    pub utp_shards: Option<usize>,
    /// Where the tracker list is kept between runs; `None` keeps it in memory.
    pub tracker_store: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            dht_port: DEFAULT_DHT_PORT,
            dht_interval_secs: DEFAULT_DHT_INTERVAL.as_secs(),
            lsd_enabled: true,
            lsd_interval_secs: DEFAULT_LSD_INTERVAL.as_secs(),
            announce_interval_secs: DEFAULT_ANNOUNCE_INTERVAL.as_secs(),
            tracker_persist_interval_secs: DEFAULT_TRACKER_PERSIST_INTERVAL.as_secs(),
            utp_shards: None,
            tracker_store: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn dht_interval(&self) -> Duration {
        secs_at_least_one(self.dht_interval_secs)
    }

    pub fn lsd_interval(&self) -> Duration {
        secs_at_least_one(self.lsd_interval_secs)
    }

    pub fn announce_interval(&self) -> Duration {
        secs_at_least_one(self.announce_interval_secs)
    }

    pub fn tracker_persist_interval(&self) -> Duration {
        secs_at_least_one(self.tracker_persist_interval_secs)
    }
}

// tokio::time::interval panics on a zero period
fn secs_at_least_one(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
