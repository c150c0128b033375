//! Absent-resource tracking.
//!
//! Records resources (tiles, or any other hashable id) that recently failed
//! to load so the retrieval pipeline does not keep asking the origin for
//! them.
//!
//! # Suppression rules
//!
//! ```text
//! mark_absent ──► attempts += 1, last_failure = now
//!
//! is_absent:
//!   attempts <  max_attempts ──► absent while now - last_failure < min_check_interval
//!   attempts >= max_attempts ──► absent until unmark_absent
//!                                (or until try_again_interval, if configured)
//! ```
//!
//! Re-eligibility is derived from elapsed time on lookup; no background timer
//! runs. The list is bounded: when full, the entry with the oldest failure is
//! evicted.
//!
//! # Thread Safety
//!
//! Backed by a `DashMap`, so all workers may query and update it
//! concurrently through a shared reference.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::config::{
    LayerConfig, DEFAULT_MAX_ABSENT_ATTEMPTS, DEFAULT_MIN_ABSENT_CHECK_INTERVAL_MS,
};

/// Default maximum number of tracked resources.
pub const DEFAULT_ABSENT_CAPACITY: usize = 2_000;

/// When to stop retrying an absent resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsentPolicy {
    /// Failures after which suppression becomes permanent.
    pub max_attempts: u32,
    /// Minimum time between attempts while below `max_attempts`.
    pub min_check_interval: Duration,
    /// Lifts permanent suppression after this long, if set.
    pub try_again_interval: Option<Duration>,
    /// Maximum number of tracked resources.
    pub capacity: usize,
}

impl Default for AbsentPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ABSENT_ATTEMPTS,
            min_check_interval: Duration::from_millis(DEFAULT_MIN_ABSENT_CHECK_INTERVAL_MS),
            try_again_interval: None,
            capacity: DEFAULT_ABSENT_CAPACITY,
        }
    }
}

impl AbsentPolicy {
    /// Policy taken from a layer configuration.
    pub fn from_config(config: &LayerConfig) -> Self {
        Self {
            max_attempts: config.max_absent_attempts.max(1),
            min_check_interval: config.min_absent_check_interval(),
            try_again_interval: config.max_absent_try_again(),
            capacity: DEFAULT_ABSENT_CAPACITY,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_min_check_interval(mut self, interval: Duration) -> Self {
        self.min_check_interval = interval;
        self
    }

    pub fn with_try_again_interval(mut self, interval: Duration) -> Self {
        self.try_again_interval = Some(interval);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct AbsentEntry {
    attempts: u32,
    last_failure: Instant,
}

/// Thread-safe record of resources believed absent.
///
/// # Example
///
/// ```
/// use globetile::absent::{AbsentPolicy, AbsentResourceList};
///
/// let list = AbsentResourceList::new(AbsentPolicy::default());
/// list.mark_absent(42u64);
/// assert!(list.is_absent(&42));
///
/// list.unmark_absent(&42);
/// assert!(!list.is_absent(&42));
/// ```
#[derive(Debug)]
pub struct AbsentResourceList<K: Eq + Hash> {
    entries: DashMap<K, AbsentEntry>,
    policy: AbsentPolicy,
}

impl<K: Eq + Hash + Clone> AbsentResourceList<K> {
    pub fn new(policy: AbsentPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    /// The active policy.
    pub fn policy(&self) -> &AbsentPolicy {
        &self.policy
    }

    /// Records one failure for `id`.
    pub fn mark_absent(&self, id: K) {
        let now = Instant::now();
        if !self.entries.contains_key(&id) && self.entries.len() >= self.policy.capacity {
            self.evict_oldest();
        }

        let mut entry = self.entries.entry(id).or_insert(AbsentEntry {
            attempts: 0,
            last_failure: now,
        });
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_failure = now;
        trace!(attempts = entry.attempts, "Resource marked absent");
    }

    /// Forgets every failure recorded for `id`.
    pub fn unmark_absent(&self, id: &K) {
        self.entries.remove(id);
    }

    /// Returns true if `id` should not be requested right now.
    pub fn is_absent(&self, id: &K) -> bool {
        let Some(entry) = self.entries.get(id).map(|e| *e) else {
            return false;
        };
        let elapsed = entry.last_failure.elapsed();

        if entry.attempts >= self.policy.max_attempts {
            match self.policy.try_again_interval {
                Some(interval) if elapsed >= interval => {
                    self.entries.remove(id);
                    false
                }
                _ => true,
            }
        } else {
            elapsed < self.policy.min_check_interval
        }
    }

    /// Number of failures recorded for `id`.
    pub fn attempts(&self, id: &K) -> u32 {
        self.entries.get(id).map(|e| e.attempts).unwrap_or(0)
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every tracked resource.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_failure)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
