//! Bounded, deduplicating priority queue for tile requests.
//!
//! Requests are ordered by priority (lower values first, typically the
//! distance from the viewer), then by submission order. Each tile identity
//! ([`RequestKey`]) is tracked from submission until the worker reports
//! completion, so a tile is never queued twice nor serviced by two workers
//! at once.
//!
//! ```text
//!  submit ──► pending map ──► heap ──► pop ──► InFlight ──► complete
//!               │  Queued{seq, priority}          │
//!               │                                 └─ duplicates coalesced
//!               └─ more urgent resubmission: new heap entry, old one
//!                  becomes stale and is skipped on pop
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::pyramid::TileKey;

/// Default maximum number of queued (not in-flight) requests.
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Identity of a request: the dataset's cache name plus the tile address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub dataset: String,
    pub tile: TileKey,
}

impl RequestKey {
    pub fn new(dataset: impl Into<String>, tile: TileKey) -> Self {
        Self {
            dataset: dataset.into(),
            tile,
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dataset, self.tile)
    }
}

/// Result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    /// Added to the queue.
    Queued,
    /// Already queued or in flight; nothing changed.
    Coalesced,
    /// Already queued; moved forward to the more urgent priority.
    Reprioritized,
    /// The queue is at capacity.
    QueueFull,
    /// The queue has been closed.
    Closed,
}

impl SubmitResult {
    /// True if the tile will be serviced.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            SubmitResult::Queued | SubmitResult::Coalesced | SubmitResult::Reprioritized
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Queued { sequence: u64, priority: f64 },
    InFlight,
}

struct Entry<T> {
    priority: f64,
    sequence: u64,
    key: RequestKey,
    request: T,
}

// BinaryHeap is a max-heap: the smallest priority value must compare
// greatest, and within a priority the oldest sequence.
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct State<T> {
    heap: BinaryHeap<Entry<T>>,
    pending: HashMap<RequestKey, Pending>,
    queued: usize,
    next_sequence: u64,
}

/// Thread-safe request queue shared by submitters and workers.
///
/// Submission never blocks; [`pop`](Self::pop) waits while the queue is
/// empty.
pub struct RequestQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> RequestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
                queued: 0,
                next_sequence: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Submits a request for `key` with the given priority.
    pub fn submit(&self, key: RequestKey, priority: f64, request: T) -> SubmitResult {
        if self.closed.load(AtomicOrdering::Acquire) {
            return SubmitResult::Closed;
        }
        let priority = if priority.is_nan() { f64::MAX } else { priority };

        let mut state = self.state.lock();
        let sequence = state.next_sequence;

        let result = match state.pending.get(&key).copied() {
            Some(Pending::InFlight) => return SubmitResult::Coalesced,
            Some(Pending::Queued { priority: queued, .. }) if priority >= queued => {
                return SubmitResult::Coalesced
            }
            Some(Pending::Queued { .. }) => SubmitResult::Reprioritized,
            None if state.queued >= self.capacity => return SubmitResult::QueueFull,
            None => {
                state.queued += 1;
                SubmitResult::Queued
            }
        };

        state.next_sequence += 1;
        state
            .pending
            .insert(key.clone(), Pending::Queued { sequence, priority });
        state.heap.push(Entry {
            priority,
            sequence,
            key,
            request,
        });
        drop(state);

        self.notify.notify_one();
        result
    }

    /// Takes the most urgent request without waiting, marking it in flight.
    pub fn try_pop(&self) -> Option<(RequestKey, T)> {
        let mut state = self.state.lock();
        while let Some(entry) = state.heap.pop() {
            let current = matches!(
                state.pending.get(&entry.key),
                Some(Pending::Queued { sequence, .. }) if *sequence == entry.sequence
            );
            if !current {
                // Superseded by a more urgent resubmission.
                continue;
            }
            state.pending.insert(entry.key.clone(), Pending::InFlight);
            state.queued -= 1;
            return Some((entry.key, entry.request));
        }
        None
    }

    /// Waits for the most urgent request. Returns `None` once the queue is
    /// closed.
    pub async fn pop(&self) -> Option<(RequestKey, T)> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(AtomicOrdering::Acquire) {
                return None;
            }
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            notified.await;
        }
    }

    /// Marks a popped request finished so the tile may be submitted again.
    pub fn complete(&self, key: &RequestKey) {
        let mut state = self.state.lock();
        if matches!(state.pending.get(key), Some(Pending::InFlight)) {
            state.pending.remove(key);
        }
    }

    /// Rejects further submissions and wakes every waiting worker.
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }

    /// Number of queued requests, excluding in-flight ones.
    pub fn len(&self) -> usize {
        self.state.lock().queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests handed to workers and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .pending
            .values()
            .filter(|p| matches!(p, Pending::InFlight))
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
