use std::sync::Arc;

use futures::future::BoxFuture;

use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::{AnnounceRequest, AnnounceResponse, ScrapeResponse};
use super::udp::UdpTracker;
use crate::torrent::InfoHash;

/// One tracker endpoint, whatever its transport.
pub trait TrackerProtocol: Send + Sync {
    fn announce(&self, request: AnnounceRequest) -> BoxFuture<'_, Result<AnnounceResponse, TrackerError>>;

    fn scrape(&self, info_hashes: Vec<InfoHash>) -> BoxFuture<'_, Result<ScrapeResponse, TrackerError>>;
}

/// Builds the protocol client for an announce URL.
pub type TrackerConnector =
    Arc<dyn Fn(&str) -> Result<Arc<dyn TrackerProtocol>, TrackerError> + Send + Sync>;

/// `http(s)://` goes to [`HttpTracker`], `udp://` to [`UdpTracker`].
pub fn connect(url: &str) -> Result<Arc<dyn TrackerProtocol>, TrackerError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Arc::new(HttpTracker::new(url)?))
    } else if url.starts_with("udp://") {
        Ok(Arc::new(UdpTracker::new(url)?))
    } else {
        Err(TrackerError::UnsupportedProtocol(url.to_string()))
    }
}

pub fn default_connector() -> TrackerConnector {
    Arc::new(connect)
}

impl TrackerProtocol for HttpTracker {
    fn announce(&self, request: AnnounceRequest) -> BoxFuture<'_, Result<AnnounceResponse, TrackerError>> {
        Box::pin(async move { HttpTracker::announce(self, &request).await })
    }

    fn scrape(&self, info_hashes: Vec<InfoHash>) -> BoxFuture<'_, Result<ScrapeResponse, TrackerError>> {
        Box::pin(async move { HttpTracker::scrape(self, &info_hashes).await })
    }
}

impl TrackerProtocol for UdpTracker {
    fn announce(&self, request: AnnounceRequest) -> BoxFuture<'_, Result<AnnounceResponse, TrackerError>> {
        Box::pin(async move { UdpTracker::announce(self, &request).await })
    }

    fn scrape(&self, info_hashes: Vec<InfoHash>) -> BoxFuture<'_, Result<ScrapeResponse, TrackerError>> {
        Box::pin(async move { UdpTracker::scrape(self, &info_hashes).await })
    }
}
