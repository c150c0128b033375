//! Tiled imagery layers.
//!
//! A layer is described by three small capabilities instead of a class
//! hierarchy:
//!
//! | Trait                  | Provides                                       |
//! |------------------------|------------------------------------------------|
//! | [`TilePyramid`]        | level set geometry, tile selection for a view  |
//! | [`Cacheable`]          | file store, cache paths, absent tracking       |
//! | [`NetworkRetrievable`] | request URLs, transport, network on/off switch |
//!
//! [`TileLayer`] implements all three and is what the retrieval pipeline
//! consumes.

mod tile_layer;
mod url;

use std::sync::Arc;

use crate::absent::AbsentResourceList;
use crate::geo::{LatLon, Sector};
use crate::pyramid::{LevelSet, Tile, TileKey};
use crate::store::FileStore;
use crate::transport::Transport;

pub use tile_layer::{CachedTile, TileLayer};
pub use url::UrlBuilder;

/// Addressable as a tile pyramid.
pub trait TilePyramid {
    fn level_set(&self) -> &LevelSet;

    /// Sector of the tile addressed by `key`.
    fn tile_sector(&self, key: &TileKey) -> Sector {
        self.level_set()
            .tile_sector(key.level(), key.row(), key.col())
    }

    /// Tiles needed to draw `sectors` at `resolution` degrees per tile,
    /// ranked by great-circle distance from `eye` to each tile centroid.
    ///
    /// Empty placeholder levels are never selected; the result is
    /// deduplicated and sorted most urgent first.
    fn tiles_for_view(&self, sectors: &[Sector], eye: LatLon, resolution: f64) -> Vec<Tile> {
        let levels = self.level_set();
        let level = levels
            .level_for_resolution(resolution)
            .number()
            .max(levels.first_level().number());

        let mut seen = std::collections::HashSet::new();
        let mut tiles: Vec<Tile> = sectors
            .iter()
            .flat_map(|sector| levels.tiles_in_sector(level, sector))
            .filter(|tile| seen.insert(tile.key()))
            .map(|tile| {
                let distance = eye.angular_distance(&tile.sector().centroid());
                tile.with_priority(distance)
            })
            .collect();
        tiles.sort_by(|a, b| {
            a.priority()
                .total_cmp(&b.priority())
                .then_with(|| a.key().cmp(&b.key()))
        });
        tiles
    }
}

/// Backed by a persistent tile cache.
pub trait Cacheable {
    fn file_store(&self) -> &Arc<dyn FileStore>;

    /// Relative cache path of a tile, `None` if its level does not exist.
    fn cache_path(&self, key: &TileKey) -> Option<String>;

    /// Tiles believed unavailable.
    fn absent_tiles(&self) -> &AbsentResourceList<TileKey>;

    /// True if the tile's file exists in any store location.
    fn is_tile_cached(&self, key: &TileKey) -> bool {
        self.cache_path(key)
            .and_then(|path| self.file_store().find_file(&path, true))
            .is_some()
    }
}

/// Fetchable from a remote service.
pub trait NetworkRetrievable {
    fn transport(&self) -> &Arc<dyn Transport>;

    /// Request URL of a tile, `None` for cache-only layers.
    fn resource_url(&self, key: &TileKey) -> Option<String>;

    fn is_network_retrieval_enabled(&self) -> bool;

    fn set_network_retrieval_enabled(&self, enabled: bool);
}
