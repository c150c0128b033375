//! Notifications emitted by the retrieval pipeline.
//!
//! Events go out on a `tokio::sync::broadcast` channel. Consumers (a
//! renderer waiting for textures, a progress display) subscribe and drain
//! the channel on their own schedule; a lagging consumer loses the oldest
//! events, never blocks a worker.

use std::path::PathBuf;

use crate::pyramid::TileKey;

use super::classify::AbsentReason;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// Outcome of one tile request, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalEvent {
    /// The tile is in the cache at `location` (the dataset changed).
    TileReady {
        dataset: String,
        key: TileKey,
        location: PathBuf,
    },
    /// The tile was judged unavailable and marked absent.
    TileAbsent {
        dataset: String,
        key: TileKey,
        reason: AbsentReason,
    },
    /// A local defect prevented storing the tile.
    TileFailed {
        dataset: String,
        key: TileKey,
        error: String,
    },
    /// The request was abandoned by cancellation.
    Cancelled { dataset: String, key: TileKey },
}

impl RetrievalEvent {
    pub fn dataset(&self) -> &str {
        match self {
            RetrievalEvent::TileReady { dataset, .. }
            | RetrievalEvent::TileAbsent { dataset, .. }
            | RetrievalEvent::TileFailed { dataset, .. }
            | RetrievalEvent::Cancelled { dataset, .. } => dataset,
        }
    }

    pub fn key(&self) -> TileKey {
        match self {
            RetrievalEvent::TileReady { key, .. }
            | RetrievalEvent::TileAbsent { key, .. }
            | RetrievalEvent::TileFailed { key, .. }
            | RetrievalEvent::Cancelled { key, .. } => *key,
        }
    }
}
