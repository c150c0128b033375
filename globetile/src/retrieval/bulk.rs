//! Bulk retrieval: make a region available offline.
//!
//! Both entry points work on a sector, a target resolution (degrees per
//! tile) and a destination file store. Every non-empty level from 0 up to
//! the level for the resolution is covered, so the region can be drawn at
//! any zoom up to the target without the network.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::geo::Sector;
use crate::layer::{Cacheable, TilePyramid, TileLayer};
use crate::pyramid::{Level, Tile};
use crate::store::FileStore;
use crate::texture::DDS_HEADER_SIZE;

use super::fetcher::{RetrievalOutcome, TileFetcher};

/// Default number of concurrent downloads.
pub const DEFAULT_BULK_CONCURRENCY: usize = 8;

/// Progress report sent after each tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkProgress {
    pub completed: u64,
    pub total: u64,
    pub bytes_downloaded: u64,
}

/// Result of [`BulkRetriever::make_local`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub total: u64,
    pub already_local: u64,
    pub downloaded: u64,
    pub bytes_downloaded: u64,
    pub absent: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl BulkSummary {
    fn record(&mut self, outcome: &RetrievalOutcome) {
        match outcome {
            RetrievalOutcome::CacheHit(_) => self.already_local += 1,
            RetrievalOutcome::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes_downloaded += *bytes as u64;
            }
            RetrievalOutcome::Absent(_) => self.absent += 1,
            RetrievalOutcome::Skipped(_) => self.skipped += 1,
            RetrievalOutcome::Cancelled => self.cancelled += 1,
            RetrievalOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// True if every tile is now local.
    pub fn is_complete(&self) -> bool {
        self.already_local + self.downloaded == self.total
    }
}

/// Result of [`BulkRetriever::estimate_missing_bytes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkEstimate {
    pub total_tiles: u64,
    pub missing_tiles: u64,
    pub estimated_bytes: u64,
}

/// Downloads every tile of a region into a file store.
///
/// # Example
///
/// ```no_run
/// # async fn run(layer: globetile::layer::TileLayer) -> Result<(), globetile::config::ConfigError> {
/// use std::sync::Arc;
/// use globetile::geo::Sector;
/// use globetile::layer::Cacheable;
/// use globetile::retrieval::BulkRetriever;
/// use tokio_util::sync::CancellationToken;
///
/// let region = Sector::from_degrees(45.0, 48.0, 5.0, 11.0);
/// let store = Arc::clone(layer.file_store());
/// let bulk = BulkRetriever::new(CancellationToken::new()).with_concurrency(4);
///
/// let estimate = bulk.estimate_missing_bytes(&layer, &region, 0.5, store.as_ref());
/// println!("{} tiles, about {} bytes", estimate.missing_tiles, estimate.estimated_bytes);
///
/// let summary = bulk.make_local(&layer, &region, 0.5, store).await?;
/// assert!(summary.downloaded <= summary.total);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BulkRetriever {
    cancel: CancellationToken,
    concurrency: usize,
    progress: Option<mpsc::UnboundedSender<BulkProgress>>,
}

impl BulkRetriever {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            concurrency: DEFAULT_BULK_CONCURRENCY,
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reports progress after every tile.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<BulkProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Tiles of every non-empty level up to the level for `resolution` that
    /// intersect `sector`.
    pub fn tiles_for_region(&self, layer: &TileLayer, sector: &Sector, resolution: f64) -> Vec<Tile> {
        region_levels(layer, resolution)
            .flat_map(|level| layer.level_set().tiles_in_sector(level.number(), sector))
            .collect()
    }

    /// Downloads every tile of the region missing from `store`.
    ///
    /// Tiles are fetched coarse levels first, at most `concurrency` at a
    /// time. Cancelling the token stops the run; tiles not yet fetched are
    /// counted as cancelled.
    pub async fn make_local(
        &self,
        layer: &TileLayer,
        sector: &Sector,
        resolution: f64,
        store: Arc<dyn FileStore>,
    ) -> Result<BulkSummary, ConfigError> {
        let layer = Arc::new(layer.with_file_store(store)?);
        let tiles = self.tiles_for_region(&layer, sector, resolution);
        let total = tiles.len() as u64;
        info!(
            dataset = %layer.cache_name(),
            tiles = total,
            resolution,
            "Bulk retrieval starting"
        );

        let fetcher = TileFetcher::new(self.cancel.clone());
        let mut summary = BulkSummary {
            total,
            ..BulkSummary::default()
        };
        let mut completed = 0u64;

        let mut outcomes = stream::iter(tiles)
            .map(|tile| {
                let fetcher = &fetcher;
                let layer = &layer;
                async move { fetcher.retrieve(&tile, layer).await }
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            summary.record(&outcome);
            completed += 1;
            if let Some(progress) = &self.progress {
                // The receiver may have gone away.
                let _ = progress.send(BulkProgress {
                    completed,
                    total,
                    bytes_downloaded: summary.bytes_downloaded,
                });
            }
        }

        info!(
            dataset = %layer.cache_name(),
            downloaded = summary.downloaded,
            already_local = summary.already_local,
            absent = summary.absent,
            failed = summary.failed,
            cancelled = summary.cancelled,
            bytes = summary.bytes_downloaded,
            "Bulk retrieval complete"
        );
        Ok(summary)
    }

    /// Estimates the bytes still needed to make the region local in `store`.
    ///
    /// Missing tiles of a level are costed at the average size of that
    /// level's tiles already in the store, or from the tile format when none
    /// are. Blocking.
    pub fn estimate_missing_bytes(
        &self,
        layer: &TileLayer,
        sector: &Sector,
        resolution: f64,
        store: &dyn FileStore,
    ) -> BulkEstimate {
        let mut estimate = BulkEstimate::default();

        for level in region_levels(layer, resolution) {
            let tiles = layer.level_set().tiles_in_sector(level.number(), sector);
            let mut missing = 0u64;
            let mut present = 0u64;
            let mut present_bytes = 0u64;

            for tile in &tiles {
                let Some(path) = layer.cache_path(&tile.key()) else {
                    continue;
                };
                match store
                    .find_file(&path, true)
                    .and_then(|location| std::fs::metadata(location).ok())
                {
                    Some(metadata) => {
                        present += 1;
                        present_bytes += metadata.len();
                    }
                    None => missing += 1,
                }
            }

            let per_tile = if present > 0 {
                present_bytes / present
            } else {
                estimated_tile_size(layer, level)
            };
            debug!(
                level = level.number(),
                tiles = tiles.len(),
                missing,
                per_tile,
                "Estimated level"
            );
            estimate.total_tiles += tiles.len() as u64;
            estimate.missing_tiles += missing;
            estimate.estimated_bytes += missing * per_tile;
        }
        estimate
    }
}

fn region_levels<'a>(layer: &'a TileLayer, resolution: f64) -> impl Iterator<Item = &'a Level> {
    let levels = layer.level_set();
    let target = levels.level_for_resolution(resolution).number();
    levels
        .levels()
        .iter()
        .filter(move |level| level.number() <= target && !level.is_empty())
}

/// Expected size of one tile of `level` when no sample is on disk.
fn estimated_tile_size(layer: &TileLayer, level: &Level) -> u64 {
    let (width, height) = (level.tile_width(), level.tile_height());
    let raw = width as u64 * height as u64 * 3;
    match level.format_suffix().to_ascii_lowercase().as_str() {
        "dds" => {
            (layer.config().dds_compression.surface_size(width, height) + DDS_HEADER_SIZE) as u64
        }
        "png" => raw / 2,
        "jpg" | "jpeg" => raw / 10,
        _ => raw,
    }
}
