//! Layer configuration.
//!
//! A [`LayerConfig`] is the typed options struct from which a
//! [`LevelSet`](crate::pyramid::LevelSet) and a
//! [`TileLayer`](crate::layer::TileLayer) are built. It can be loaded from:
//!
//! - an INI file with a `[layer]` section ([`LayerConfig::load_ini`])
//! - the JSON metadata file the retrieval pipeline writes next to the cached
//!   tiles ([`LayerConfig::read_metadata`])
//!
//! # Example
//!
//! ```
//! use globetile::config::LayerConfig;
//!
//! let config = LayerConfig::new("bmng", "Earth/BMNG")
//!     .with_service_url("https://tiles.example.com/imagery")
//!     .with_levels(5, 0)
//!     .with_tile_size(512, 512);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.metadata_path(), "Earth/BMNG/layer.json");
//! ```

mod error;
mod layer;
mod metadata;
mod parser;

use std::path::PathBuf;

pub use error::ConfigError;
pub use layer::{
    LayerConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_FORMAT_SUFFIX, DEFAULT_MAX_ABSENT_ATTEMPTS,
    DEFAULT_MIN_ABSENT_CHECK_INTERVAL_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_STALE_REQUEST_LIMIT_MS,
    DEFAULT_TILE_SIZE,
};
pub use metadata::METADATA_FILE_NAME;

/// Default cache root: `<platform cache dir>/globetile`.
///
/// Falls back to `~/.cache/globetile` and finally to a relative `.cache`
/// directory when no home directory can be determined.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("globetile")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_dir_ends_with_crate_name() {
        assert!(default_cache_dir().ends_with("globetile"));
    }
}
