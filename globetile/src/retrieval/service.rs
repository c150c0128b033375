//! Worker pool draining the request queue.
//!
//! ```text
//!  submit(tile, layer) ──► RequestQueue ──► worker 1 ─┐
//!      (never blocks)          │        ──► worker 2 ─┼─► TileFetcher ──► events
//!                              │        ──► worker n ─┘
//!                              └─ duplicates coalesced, capacity bounded
//! ```
//!
//! The service is an explicitly constructed object: create it, `start()` it
//! inside a tokio runtime, submit tiles, and `shutdown()` it on teardown.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::layer::TileLayer;
use crate::pyramid::Tile;

use super::events::{RetrievalEvent, DEFAULT_EVENT_CAPACITY};
use super::fetcher::TileFetcher;
use super::queue::{RequestKey, RequestQueue, SubmitResult, DEFAULT_QUEUE_CAPACITY};

// =============================================================================
// Configuration
// =============================================================================

/// Default number of concurrent retrieval workers.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Configuration for the retrieval service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Number of worker tasks.
    pub pool_size: usize,

    /// Maximum number of queued requests.
    pub queue_capacity: usize,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RetrievalConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

// =============================================================================
// Service
// =============================================================================

/// A queued tile and the layer it belongs to.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub tile: Tile,
    pub layer: Arc<TileLayer>,
}

/// Prioritised, deduplicating tile retrieval with a fixed worker pool.
///
/// # Example
///
/// ```no_run
/// # async fn run(layer: std::sync::Arc<globetile::layer::TileLayer>) {
/// use globetile::geo::LatLon;
/// use globetile::layer::TilePyramid;
/// use globetile::retrieval::{RetrievalConfig, RetrievalService};
///
/// let service = RetrievalService::new(RetrievalConfig::default().with_pool_size(4));
/// let mut events = service.subscribe();
/// service.start();
///
/// let view = *layer.level_set().sector();
/// for tile in layer.tiles_for_view(&[view], LatLon::new(0.0, 0.0), 9.0) {
///     service.submit(tile, layer.clone());
/// }
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// service.shutdown().await;
/// # }
/// ```
pub struct RetrievalService {
    config: RetrievalConfig,
    queue: Arc<RequestQueue<TileRequest>>,
    events: broadcast::Sender<RetrievalEvent>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RetrievalService {
    pub fn new(config: RetrievalConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            queue: Arc::new(RequestQueue::new(config.queue_capacity)),
            events,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Spawns the worker pool. Calling it again has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() || self.queue.is_closed() {
            return;
        }

        let fetcher = TileFetcher::new(self.cancel.clone()).with_events(self.events.clone());
        for id in 0..self.config.pool_size.max(1) {
            let queue = Arc::clone(&self.queue);
            let fetcher = fetcher.clone();
            workers.push(tokio::spawn(worker_loop(id, queue, fetcher)));
        }
        info!(
            workers = self.config.pool_size,
            queue_capacity = self.config.queue_capacity,
            "Retrieval service started"
        );
    }

    /// Queues `tile` at its current priority. Never blocks.
    pub fn submit(&self, tile: Tile, layer: Arc<TileLayer>) -> SubmitResult {
        let key = RequestKey::new(layer.cache_name(), tile.key());
        let priority = tile.priority();
        let result = self.queue.submit(key, priority, TileRequest { tile, layer });
        match result {
            SubmitResult::QueueFull => warn!(priority, "Retrieval queue full, request dropped"),
            SubmitResult::Coalesced => debug!("Request coalesced"),
            _ => {}
        }
        result
    }

    /// Receives an event for every completed request.
    pub fn subscribe(&self) -> broadcast::Receiver<RetrievalEvent> {
        self.events.subscribe()
    }

    /// Token cancelling every in-flight fetch.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of requests waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of requests being serviced.
    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    /// Cancels in-flight fetches, discards queued requests and waits for the
    /// workers to exit.
    pub async fn shutdown(&self) {
        info!("Retrieval service shutting down");
        self.cancel.cancel();
        self.queue.close();

        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Retrieval worker panicked");
            }
        }
        info!("Retrieval service stopped");
    }
}

impl Drop for RetrievalService {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.close();
    }
}

/// Completes a popped request when dropped, so a panicking fetch does not
/// leave its tile in flight forever.
struct InFlight<'a, T> {
    queue: &'a RequestQueue<T>,
    key: RequestKey,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.queue.complete(&self.key);
    }
}

async fn worker_loop(id: usize, queue: Arc<RequestQueue<TileRequest>>, fetcher: TileFetcher) {
    debug!(worker = id, "Retrieval worker started");
    while let Some((key, request)) = queue.pop().await {
        let done = InFlight { queue: &queue, key };
        let outcome = fetcher.retrieve(&request.tile, &request.layer).await;
        debug!(worker = id, request = %done.key, ?outcome, "Request complete");
    }
    debug!(worker = id, "Retrieval worker stopped");
}
