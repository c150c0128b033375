//! One resolution tier of a tile pyramid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::geo::LatLon;

use super::TileKey;

/// Sentinel stored in the expiry field when no expiry is configured.
const NO_EXPIRY: u64 = 0;

/// One resolution level of a [`LevelSet`](super::LevelSet).
///
/// Levels are created once by the level set and are immutable afterwards,
/// except for the expiry time, which a remote service may refresh. The
/// expiry lives in an atomic so it can be updated through a shared reference
/// while workers read it.
#[derive(Debug)]
pub struct Level {
    number: u32,
    tile_delta: LatLon,
    tile_width: u32,
    tile_height: u32,
    format_suffix: String,
    dataset: String,
    service: Option<String>,
    cache_name: String,
    expiry_time_ms: AtomicU64,
    active: bool,
    empty: bool,
}

impl Level {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        number: u32,
        tile_delta: LatLon,
        tile_width: u32,
        tile_height: u32,
        format_suffix: &str,
        dataset: &str,
        service: Option<&str>,
        cache_name: &str,
        expiry_time_ms: Option<u64>,
        empty: bool,
    ) -> Self {
        let active = service.is_some() && !empty;
        Self {
            number,
            tile_delta,
            tile_width,
            tile_height,
            format_suffix: format_suffix.trim_start_matches('.').to_string(),
            dataset: dataset.to_string(),
            service: service.map(str::to_string),
            cache_name: cache_name.to_string(),
            expiry_time_ms: AtomicU64::new(expiry_time_ms.unwrap_or(NO_EXPIRY)),
            active,
            empty,
        }
    }

    /// Level number (0 = coarsest).
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Angular size of one tile at this level.
    pub fn tile_delta(&self) -> LatLon {
        self.tile_delta
    }

    /// Tile width in pixels.
    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Tile height in pixels.
    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// Cache file suffix, without the leading dot (e.g. `dds`).
    pub fn format_suffix(&self) -> &str {
        &self.format_suffix
    }

    /// Dataset identifier passed to the remote service.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Remote service URL, if the level is network retrievable.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Cache directory name of the owning dataset.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Size of one texel in radians of latitude.
    pub fn texel_size(&self) -> f64 {
        self.tile_delta.lat.to_radians() / self.tile_height as f64
    }

    /// Returns true if tiles of this level can be requested from a remote service.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true for placeholder levels that carry no imagery.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// The expiry time, if one is configured.
    pub fn expiry_time(&self) -> Option<SystemTime> {
        match self.expiry_time_ms.load(Ordering::Acquire) {
            NO_EXPIRY => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Updates the expiry time; `None` clears it.
    pub fn set_expiry_time(&self, expiry: Option<SystemTime>) {
        let ms = expiry
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(NO_EXPIRY);
        self.expiry_time_ms.store(ms, Ordering::Release);
    }

    /// Returns true if a file last modified at `modified` is out of date.
    ///
    /// A file is expired when the expiry time has already passed and the
    /// file was written before it. Expiry times in the future never expire
    /// anything yet.
    pub fn is_expired(&self, modified: SystemTime) -> bool {
        match self.expiry_time() {
            Some(expiry) => expiry <= SystemTime::now() && modified < expiry,
            None => false,
        }
    }

    /// Relative cache path of the level directory: `<cacheName>/<level>`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.cache_name, self.number)
    }

    /// Relative cache path of one tile:
    /// `<cacheName>/<level>/<row>/<level>_<row>_<col>.<suffix>`.
    pub fn tile_path(&self, key: &TileKey) -> String {
        format!(
            "{}/{}/{}/{}_{}_{}.{}",
            self.cache_name,
            self.number,
            key.row(),
            self.number,
            key.row(),
            key.col(),
            self.format_suffix
        )
    }
}
