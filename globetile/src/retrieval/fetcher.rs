//! Per-tile retrieval procedure.
//!
//! ```text
//!  Tile ──► level usable? ──► lock path ──► cached? ──fresh──► CacheHit
//!                                             │ expired: delete
//!                                             ▼
//!                               absent? / network off? / no URL ──► Skipped
//!                                             │
//!                                             ▼
//!                                   transport.fetch(url)
//!                                             │
//!                                        classify()
//!                      ┌──────────────────────┼──────────────────────┐
//!                      ▼                      ▼                      ▼
//!                   Absent               Store bytes           Transcode + store
//!                 (mark absent)               └──────────┬───────────┘
//!                                                        ▼
//!                                     unmark, metadata, TileReady event
//! ```
//!
//! The path lock is held from the cache check until the file is written, so
//! two fetchers never interleave reads and writes of the same file.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::layer::{CachedTile, Cacheable, NetworkRetrievable, TilePyramid, TileLayer};
use crate::pyramid::{Tile, TileKey};
use crate::store::{write_atomic, StoreError};
use crate::texture::TextureError;
use crate::transport::TransportError;

use super::classify::{classify, AbsentReason, Classification};
use super::events::RetrievalEvent;

/// Local failure while storing a fetched tile.
///
/// These are defects of this process, not signals that the resource is
/// unavailable, so they never mark the tile absent.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Transcoding failed: {0}")]
    Texture(#[from] TextureError),

    #[error("Cache write failed: {0}")]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Why a tile was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The level is a placeholder without imagery, or does not exist.
    EmptyLevel,
    /// The tile is currently believed absent.
    Absent,
    /// Network retrieval is switched off for the layer.
    NetworkDisabled,
    /// The layer has no remote service.
    NoService,
}

/// Result of retrieving one tile.
#[derive(Debug)]
pub enum RetrievalOutcome {
    /// A current copy was already cached.
    CacheHit(PathBuf),
    /// Fetched and written to the cache.
    Downloaded {
        location: PathBuf,
        bytes: usize,
        transcoded: bool,
    },
    /// The service does not have the tile; it is now marked absent.
    Absent(AbsentReason),
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// Interrupted by cancellation; nothing was marked.
    Cancelled,
    /// Fetched but could not be stored.
    Failed(RetrievalError),
}

impl RetrievalOutcome {
    /// True if the tile is in the cache afterwards.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            RetrievalOutcome::CacheHit(_) | RetrievalOutcome::Downloaded { .. }
        )
    }
}

/// Runs the retrieve-classify-persist procedure for single tiles.
///
/// Shared by the worker pool and bulk retrieval. Every fetch observes the
/// fetcher's cancellation token.
#[derive(Debug, Clone)]
pub struct TileFetcher {
    cancel: CancellationToken,
    events: Option<broadcast::Sender<RetrievalEvent>>,
}

impl TileFetcher {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            events: None,
        }
    }

    /// Publishes the outcome of every retrieval on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<RetrievalEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Makes `tile` present in the layer's cache, or establishes that it
    /// cannot be.
    ///
    /// Never panics and never returns an error: every failure is logged,
    /// published and reported in the outcome.
    #[instrument(skip_all, fields(dataset = %layer.cache_name(), tile = %tile.key()))]
    pub async fn retrieve(&self, tile: &Tile, layer: &Arc<TileLayer>) -> RetrievalOutcome {
        let key = tile.key();
        let (suffix, active) = match layer.level_set().level(key.level()) {
            Some(level) if !level.is_empty() => {
                (level.format_suffix().to_string(), level.is_active())
            }
            _ => return RetrievalOutcome::Skipped(SkipReason::EmptyLevel),
        };
        let Some(path) = layer.cache_path(&key) else {
            return RetrievalOutcome::Skipped(SkipReason::EmptyLevel);
        };
        if self.cancel.is_cancelled() {
            return self.cancelled(layer, key);
        }

        let lock_path = layer.file_store().write_location().join(&path);
        let _guard = layer.path_locks().lock(&lock_path).await;

        match self.check_cache(layer, key).await {
            Ok(Some(location)) => {
                layer.absent_tiles().unmark_absent(&key);
                debug!(path = %location.display(), "Cache hit");
                self.emit(RetrievalEvent::TileReady {
                    dataset: layer.cache_name().to_string(),
                    key,
                    location: location.clone(),
                });
                return RetrievalOutcome::CacheHit(location);
            }
            Ok(None) => {}
            Err(e) => return self.failed(layer, key, e),
        }

        if layer.absent_tiles().is_absent(&key) {
            debug!("Tile believed absent, not requesting");
            return RetrievalOutcome::Skipped(SkipReason::Absent);
        }
        if !layer.is_network_retrieval_enabled() {
            return RetrievalOutcome::Skipped(SkipReason::NetworkDisabled);
        }
        let Some(url) = layer.resource_url(&key).filter(|_| active) else {
            return RetrievalOutcome::Skipped(SkipReason::NoService);
        };

        let response = match layer.transport().fetch(&url, &self.cancel).await {
            Ok(response) => response,
            Err(TransportError::Cancelled) => return self.cancelled(layer, key),
            Err(e) => {
                if matches!(e, TransportError::UnsupportedProtocol(_)) {
                    error!(url = %url, error = %e, "Request abandoned");
                } else {
                    warn!(url = %url, error = %e, "Tile request failed");
                }
                return self.absent(layer, key, AbsentReason::Transport(e));
            }
        };

        let (bytes, transcode) = match classify(response, &suffix) {
            Classification::Absent(reason) => {
                match &reason {
                    AbsentReason::ErrorPayload {
                        content_type,
                        excerpt,
                    } => warn!(
                        url = %url,
                        content_type = %content_type,
                        payload = %excerpt,
                        "Server returned an error payload"
                    ),
                    other => warn!(url = %url, reason = %other, "Tile not available"),
                }
                return self.absent(layer, key, reason);
            }
            Classification::Store(bytes) => (bytes, false),
            Classification::Transcode(bytes) => (bytes, true),
        };

        let stored = {
            let layer = Arc::clone(layer);
            tokio::task::spawn_blocking(move || -> Result<(PathBuf, usize), RetrievalError> {
                let data = if transcode {
                    layer.transcoder().transcode(&bytes, &suffix)?
                } else {
                    bytes.to_vec()
                };
                let location = layer.file_store().new_file(&path)?;
                write_atomic(&location, &data)?;
                Ok((location, data.len()))
            })
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))
            .and_then(|result| result)
        };
        let (location, bytes) = match stored {
            Ok(stored) => stored,
            Err(e) => return self.failed(layer, key, e),
        };

        layer.absent_tiles().unmark_absent(&key);
        if let Err(e) = layer.ensure_metadata().await {
            warn!(error = %e, "Failed to write layer metadata");
        }
        debug!(
            path = %location.display(),
            bytes,
            transcoded = transcode,
            "Tile stored"
        );
        self.emit(RetrievalEvent::TileReady {
            dataset: layer.cache_name().to_string(),
            key,
            location: location.clone(),
        });
        RetrievalOutcome::Downloaded {
            location,
            bytes,
            transcoded: transcode,
        }
    }

    /// Returns the location of a current cached copy. An expired copy is
    /// deleted.
    async fn check_cache(
        &self,
        layer: &Arc<TileLayer>,
        key: TileKey,
    ) -> Result<Option<PathBuf>, RetrievalError> {
        let layer = Arc::clone(layer);
        tokio::task::spawn_blocking(move || -> Result<Option<PathBuf>, RetrievalError> {
            match layer.check_cache(&key) {
                CachedTile::Fresh(location) => Ok(Some(location)),
                CachedTile::Expired(location) => {
                    layer.file_store().remove_file(&location)?;
                    debug!(path = %location.display(), "Removed expired cache entry");
                    Ok(None)
                }
                CachedTile::Missing => Ok(None),
            }
        })
        .await
        .map_err(|e| RetrievalError::Task(e.to_string()))?
    }

    fn absent(&self, layer: &TileLayer, key: TileKey, reason: AbsentReason) -> RetrievalOutcome {
        layer.absent_tiles().mark_absent(key);
        self.emit(RetrievalEvent::TileAbsent {
            dataset: layer.cache_name().to_string(),
            key,
            reason: reason.clone(),
        });
        RetrievalOutcome::Absent(reason)
    }

    fn failed(&self, layer: &TileLayer, key: TileKey, err: RetrievalError) -> RetrievalOutcome {
        error!(error = %err, "Failed to store tile");
        self.emit(RetrievalEvent::TileFailed {
            dataset: layer.cache_name().to_string(),
            key,
            error: err.to_string(),
        });
        RetrievalOutcome::Failed(err)
    }

    fn cancelled(&self, layer: &TileLayer, key: TileKey) -> RetrievalOutcome {
        debug!("Retrieval cancelled");
        self.emit(RetrievalEvent::Cancelled {
            dataset: layer.cache_name().to_string(),
            key,
        });
        RetrievalOutcome::Cancelled
    }

    fn emit(&self, event: RetrievalEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}
