//! Multi-resolution tile pyramid definition.

use std::time::SystemTime;

use crate::config::{ConfigError, LayerConfig};
use crate::geo::{LatLon, Sector};

use super::{Level, Tile, TileKey};

/// Tolerance used when snapping coordinates to tile boundaries.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// The full pyramid definition of one dataset.
///
/// Levels are ordered coarsest to finest. The tile delta at level `n` is the
/// level-zero delta halved `n` times, so every tile sector can be computed in
/// constant time from its `(level, row, column)` and the tile origin.
///
/// # Example
///
/// ```
/// use globetile::config::LayerConfig;
/// use globetile::geo::LatLon;
/// use globetile::pyramid::LevelSet;
///
/// let config = LayerConfig::new("bmng", "Earth/BMNG")
///     .with_levels(3, 0)
///     .with_level_zero_tile_delta(LatLon::new(36.0, 36.0));
/// let levels = LevelSet::from_config(&config).unwrap();
///
/// assert_eq!(levels.tile_delta(2).lat, 9.0);
/// ```
#[derive(Debug)]
pub struct LevelSet {
    sector: Sector,
    level_zero_delta: LatLon,
    tile_origin: LatLon,
    levels: Vec<Level>,
    num_empty_levels: u32,
}

impl LevelSet {
    /// Builds the pyramid from a validated layer configuration.
    pub fn from_config(config: &LayerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let levels = (0..config.num_levels)
            .map(|n| {
                let scale = 2.0_f64.powi(n as i32);
                Level::new(
                    n,
                    LatLon::new(
                        config.level_zero_tile_delta.lat / scale,
                        config.level_zero_tile_delta.lon / scale,
                    ),
                    config.tile_width,
                    config.tile_height,
                    &config.format_suffix,
                    &config.dataset_name,
                    config.service_url.as_deref(),
                    &config.cache_name,
                    config.expiry_time_ms,
                    n < config.num_empty_levels,
                )
            })
            .collect();

        Ok(Self {
            sector: config.sector,
            level_zero_delta: config.level_zero_tile_delta,
            tile_origin: config.tile_origin,
            levels,
            num_empty_levels: config.num_empty_levels,
        })
    }

    /// Geographic coverage of the dataset.
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Tile delta at level zero.
    pub fn level_zero_tile_delta(&self) -> LatLon {
        self.level_zero_delta
    }

    /// Origin from which rows and columns are counted.
    pub fn tile_origin(&self) -> LatLon {
        self.tile_origin
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Number of levels.
    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Number of leading placeholder levels.
    pub fn num_empty_levels(&self) -> u32 {
        self.num_empty_levels
    }

    /// Returns the level with the given number.
    pub fn level(&self, number: u32) -> Option<&Level> {
        self.levels.get(number as usize)
    }

    /// The first level that carries imagery, or the last level if none does.
    pub fn first_level(&self) -> &Level {
        self.levels
            .iter()
            .find(|l| !l.is_empty())
            .unwrap_or_else(|| self.last_level())
    }

    /// The finest level.
    pub fn last_level(&self) -> &Level {
        // `from_config` rejects zero levels, so the vector is never empty.
        &self.levels[self.levels.len() - 1]
    }

    /// Returns true if the level exists and is a placeholder level.
    pub fn is_level_empty(&self, number: u32) -> bool {
        self.level(number).map(Level::is_empty).unwrap_or(false)
    }

    /// Tile delta at `level`: the level-zero delta halved `level` times.
    pub fn tile_delta(&self, level: u32) -> LatLon {
        let scale = 2.0_f64.powi(level as i32);
        LatLon::new(
            self.level_zero_delta.lat / scale,
            self.level_zero_delta.lon / scale,
        )
    }

    /// Sector covered by the tile at `(level, row, col)`.
    pub fn tile_sector(&self, level: u32, row: u32, col: u32) -> Sector {
        let delta = self.tile_delta(level);
        let min_lat = self.tile_origin.lat + row as f64 * delta.lat;
        let min_lon = self.tile_origin.lon + col as f64 * delta.lon;
        Sector::from_degrees(min_lat, min_lat + delta.lat, min_lon, min_lon + delta.lon)
    }

    /// Builds the tile for a key.
    pub fn tile(&self, key: TileKey) -> Tile {
        Tile::new(key, self.tile_sector(key.level(), key.row(), key.col()))
    }

    /// Address of the tile containing `position` at `level`.
    pub fn tile_key_at(&self, level: u32, position: &LatLon) -> TileKey {
        let delta = self.tile_delta(level);
        let row = first_index(position.lat, self.tile_origin.lat, delta.lat);
        let col = first_index(position.lon, self.tile_origin.lon, delta.lon);
        TileKey::new(level, row, col)
    }

    /// Relative cache path of a tile, or `None` if its level does not exist.
    pub fn tile_path(&self, key: &TileKey) -> Option<String> {
        self.level(key.level()).map(|level| level.tile_path(key))
    }

    /// The coarsest level whose tile delta is no larger than `resolution`
    /// degrees.
    ///
    /// Computed as `ceil(log2(level_zero_delta / resolution))`. A resolution
    /// finer than the last level clamps to the last level; one coarser than
    /// level zero clamps to level zero. Non-finite or non-positive values
    /// select the last level.
    pub fn level_for_resolution(&self, resolution: f64) -> &Level {
        if !resolution.is_finite() || resolution <= 0.0 {
            return self.last_level();
        }

        let max_delta = self.level_zero_delta.lat.max(self.level_zero_delta.lon);
        let ratio = max_delta / resolution;
        if ratio <= 1.0 {
            return &self.levels[0];
        }

        let n = (ratio.log2() - BOUNDARY_EPSILON).ceil().max(0.0) as usize;
        &self.levels[n.min(self.levels.len() - 1)]
    }

    /// The first non-empty level whose texel size (radians) is no larger
    /// than `texel_size`, or the last level if none is fine enough.
    pub fn level_for_texel_size(&self, texel_size: f64) -> &Level {
        self.levels
            .iter()
            .filter(|l| !l.is_empty())
            .find(|l| l.texel_size() <= texel_size)
            .unwrap_or_else(|| self.last_level())
    }

    /// Updates the expiry time of every level.
    pub fn set_expiry_time(&self, expiry: Option<SystemTime>) {
        for level in &self.levels {
            level.set_expiry_time(expiry);
        }
    }

    /// All tiles at `level` intersecting `sector`, clipped to the dataset
    /// sector. Tiles that only touch the sector along an edge are excluded.
    pub fn tiles_in_sector(&self, level: u32, sector: &Sector) -> Vec<Tile> {
        let Some(clipped) = self.sector.intersection(sector) else {
            return Vec::new();
        };
        if clipped.is_empty() || self.level(level).is_none() {
            return Vec::new();
        }

        let delta = self.tile_delta(level);
        let first_row = first_index(clipped.min_lat(), self.tile_origin.lat, delta.lat);
        let last_row = last_index(clipped.max_lat(), self.tile_origin.lat, delta.lat).max(first_row);
        let first_col = first_index(clipped.min_lon(), self.tile_origin.lon, delta.lon);
        let last_col = last_index(clipped.max_lon(), self.tile_origin.lon, delta.lon).max(first_col);

        let mut tiles = Vec::with_capacity(
            ((last_row - first_row + 1) as usize) * ((last_col - first_col + 1) as usize),
        );
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                tiles.push(self.tile(TileKey::new(level, row, col)));
            }
        }
        tiles
    }

    /// Number of tiles `tiles_in_sector` would return, without building them.
    pub fn count_tiles_in_sector(&self, level: u32, sector: &Sector) -> u64 {
        let Some(clipped) = self.sector.intersection(sector) else {
            return 0;
        };
        if clipped.is_empty() || self.level(level).is_none() {
            return 0;
        }

        let delta = self.tile_delta(level);
        let first_row = first_index(clipped.min_lat(), self.tile_origin.lat, delta.lat);
        let last_row = last_index(clipped.max_lat(), self.tile_origin.lat, delta.lat).max(first_row);
        let first_col = first_index(clipped.min_lon(), self.tile_origin.lon, delta.lon);
        let last_col = last_index(clipped.max_lon(), self.tile_origin.lon, delta.lon).max(first_col);

        (last_row - first_row + 1) as u64 * (last_col - first_col + 1) as u64
    }
}

/// Index of the tile whose lower edge is at or below `value`.
fn first_index(value: f64, origin: f64, delta: f64) -> u32 {
    ((value - origin) / delta + BOUNDARY_EPSILON).floor().max(0.0) as u32
}

/// Index of the tile whose upper edge is at or above `value`.
fn last_index(value: f64, origin: f64, delta: f64) -> u32 {
    (((value - origin) / delta - BOUNDARY_EPSILON).ceil() - 1.0).max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level_set(num_levels: u32, num_empty: u32) -> LevelSet {
        let config = LayerConfig::new("test", "Test/Layer")
            .with_levels(num_levels, num_empty)
            .with_tile_size(128, 128)
            .with_level_zero_tile_delta(LatLon::new(36.0, 36.0));
        LevelSet::from_config(&config).unwrap()
    }

    #[test]
    fn test_tile_delta_halves_per_level() {
        let levels = level_set(3, 0);
        assert_eq!(levels.tile_delta(0).lat, 36.0);
        assert_eq!(levels.tile_delta(1).lat, 18.0);
        assert_eq!(levels.tile_delta(2).lat, 9.0);
        assert_eq!(levels.level(2).unwrap().tile_delta().lon, 9.0);
    }

    #[test]
    fn test_tile_sector_from_origin() {
        let levels = level_set(3, 0);
        // Default origin is (-90, -180).
        let sector = levels.tile_sector(2, 10, 20);
        assert_eq!(sector, Sector::from_degrees(0.0, 9.0, 0.0, 9.0));
    }

    #[test]
    fn test_tile_key_at_round_trips_sector() {
        let levels = level_set(3, 0);
        let key = levels.tile_key_at(2, &LatLon::new(4.5, 4.5));
        assert_eq!(key, TileKey::new(2, 10, 20));
        assert_eq!(
            *levels.tile(key).sector(),
            Sector::from_degrees(0.0, 9.0, 0.0, 9.0)
        );
    }

    #[test]
    fn test_level_for_resolution_exact() {
        let levels = level_set(3, 0);
        assert_eq!(levels.level_for_resolution(36.0).number(), 0);
        assert_eq!(levels.level_for_resolution(18.0).number(), 1);
        assert_eq!(levels.level_for_resolution(9.0).number(), 2);
    }

    #[test]
    fn test_level_for_resolution_between_levels() {
        let levels = level_set(3, 0);
        // 10 degrees needs a delta <= 10, so level 2 (9 degrees).
        assert_eq!(levels.level_for_resolution(10.0).number(), 2);
        assert_eq!(levels.level_for_resolution(20.0).number(), 1);
    }

    #[test]
    fn test_level_for_resolution_clamps() {
        let levels = level_set(3, 0);
        assert_eq!(levels.level_for_resolution(0.001).number(), 2);
        assert_eq!(levels.level_for_resolution(90.0).number(), 0);
        assert_eq!(levels.level_for_resolution(f64::NAN).number(), 2);
        assert_eq!(levels.level_for_resolution(-1.0).number(), 2);
    }

    #[test]
    fn test_level_for_texel_size_skips_empty_levels() {
        let levels = level_set(4, 2);
        assert!(levels.is_level_empty(0));
        assert!(levels.is_level_empty(1));
        assert!(!levels.is_level_empty(2));
        assert_eq!(levels.first_level().number(), 2);

        // Level 0 is coarse enough, but it is empty.
        let coarse = levels.level(0).unwrap().texel_size();
        assert_eq!(levels.level_for_texel_size(coarse).number(), 2);
    }

    #[test]
    fn test_tiles_in_sector_single_tile() {
        let levels = level_set(3, 0);
        let tiles = levels.tiles_in_sector(2, &Sector::from_degrees(0.0, 9.0, 0.0, 9.0));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].key(), TileKey::new(2, 10, 20));
    }

    #[test]
    fn test_tiles_in_sector_spanning() {
        let levels = level_set(3, 0);
        let tiles = levels.tiles_in_sector(2, &Sector::from_degrees(1.0, 17.0, 1.0, 26.0));
        // rows 10..=11, cols 20..=22
        assert_eq!(tiles.len(), 6);
        assert_eq!(
            levels.count_tiles_in_sector(2, &Sector::from_degrees(1.0, 17.0, 1.0, 26.0)),
            6
        );
    }

    #[test]
    fn test_tiles_in_sector_outside_dataset() {
        let config = LayerConfig::new("test", "Test/Layer")
            .with_levels(3, 0)
            .with_sector(Sector::from_degrees(0.0, 36.0, 0.0, 36.0));
        let levels = LevelSet::from_config(&config).unwrap();

        let outside = Sector::from_degrees(-40.0, -10.0, -40.0, -10.0);
        assert!(levels.tiles_in_sector(1, &outside).is_empty());
        assert_eq!(levels.count_tiles_in_sector(1, &outside), 0);
    }

    #[test]
    fn test_set_expiry_updates_all_levels() {
        let levels = level_set(3, 0);
        let expiry = SystemTime::now();
        levels.set_expiry_time(Some(expiry));
        for level in levels.levels() {
            assert!(level.expiry_time().is_some());
        }
    }

    proptest! {
        #[test]
        fn prop_tile_sector_is_deterministic(level in 0u32..3, row in 0u32..20, col in 0u32..40) {
            let levels = level_set(3, 0);
            let a = levels.tile_sector(level, row, col);
            let b = levels.tile_sector(level, row, col);
            prop_assert_eq!(a, b);

            let delta = levels.tile_delta(level);
            prop_assert!((a.delta_lat() - delta.lat).abs() < 1e-9);
            prop_assert!((a.delta_lon() - delta.lon).abs() < 1e-9);
        }
    }
}
