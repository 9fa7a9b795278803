use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use futures::FutureExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

use super::error::UtpError;

/// One unit of work for a shard.
pub struct UtpRequest {
    future: BoxFuture<'static, Result<(), UtpError>>,
}

impl UtpRequest {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), UtpError>> + Send + 'static,
    {
        Self {
            future: future.boxed(),
        }
    }
}

impl fmt::Debug for UtpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UtpRequest")
    }
}

/// Handle to one shard. Cheap to clone; requests pushed through the same
/// shard run in push order.
#[derive(Debug, Clone)]
pub struct UtpShard {
    index: usize,
    tx: mpsc::UnboundedSender<UtpRequest>,
    shutdown: watch::Receiver<bool>,
}

impl UtpShard {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn push(&self, request: UtpRequest) -> Result<(), UtpError> {
        if *self.shutdown.borrow() {
            return Err(UtpError::QueueClosed);
        }
        self.tx.send(request).map_err(|_| UtpError::QueueClosed)
    }
}

struct UtpWorker {
    index: usize,
    rx: mpsc::UnboundedReceiver<UtpRequest>,
    shutdown: watch::Receiver<bool>,
}

impl UtpWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    break;
                }
                request = self.rx.recv() => {
                    match request {
                        Some(request) => self.execute(request).await,
                        None => break,
                    }
                }
            }
        }

        let abandoned = self.rx.len();
        debug!(shard = self.index, abandoned, "uTP shard stopped");
    }

    async fn execute(&self, request: UtpRequest) {
        match AssertUnwindSafe(request.future).catch_unwind().await {
            Ok(Ok(())) => trace!(shard = self.index, "uTP request done"),
            Ok(Err(e)) => warn!(shard = self.index, "uTP request failed: {}", e),
            Err(_) => error!(shard = self.index, "uTP request panicked"),
        }
    }
}

/// Fixed set of uTP request shards.
///
/// [`queue`](Self::queue) hands out shards round-robin. After
/// [`shutdown`](Self::shutdown) every worker stops once its current request
/// finishes, requests still queued are dropped, and pushes fail with
/// [`UtpError::QueueClosed`].
pub struct UtpRequestQueue {
    shards: Vec<UtpShard>,
    next: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
}

impl UtpRequestQueue {
    /// Spawns `shards` workers (at least one) on the current runtime.
    pub fn new(shards: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shards = (0..shards.max(1))
            .map(|index| {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = UtpWorker {
                    index,
                    rx,
                    shutdown: shutdown_rx.clone(),
                };
                tokio::spawn(worker.run());
                UtpShard {
                    index,
                    tx,
                    shutdown: shutdown_rx.clone(),
                }
            })
            .collect::<Vec<_>>();

        debug!("uTP request queue started with {} shards", shards.len());

        Self {
            shards,
            next: AtomicUsize::new(0),
            shutdown_tx,
        }
    }

    /// One shard per available core.
    pub fn with_default_shards() -> Self {
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(shards)
    }

    pub fn queue(&self) -> UtpShard {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        self.shards[index].clone()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            debug!("shutting down uTP request queue");
        }
    }
}

impl Drop for UtpRequestQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
