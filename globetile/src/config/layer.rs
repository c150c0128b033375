//! Typed layer options.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::geo::{LatLon, Sector};
use crate::texture::DdsFormat;

use super::metadata::METADATA_FILE_NAME;
use super::ConfigError;

/// Default cache file suffix.
pub const DEFAULT_FORMAT_SUFFIX: &str = "dds";

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default level-zero tile delta in degrees.
pub const DEFAULT_LEVEL_ZERO_DELTA: f64 = 36.0;

/// Default number of failures after which a resource stays absent.
pub const DEFAULT_MAX_ABSENT_ATTEMPTS: u32 = 3;

/// Default minimum time between attempts on an absent resource.
pub const DEFAULT_MIN_ABSENT_CHECK_INTERVAL_MS: u64 = 10_000;

/// Default transport connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 8_000;

/// Default transport read timeout (per chunk of body data).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Default limit after which an in-flight request is abandoned.
pub const DEFAULT_STALE_REQUEST_LIMIT_MS: u64 = 9_000;

/// Options needed to build a tile layer.
///
/// Every field is public so the struct can be filled from any source; call
/// [`validate`](Self::validate) before use. Missing fields take the
/// `DEFAULT_*` values when deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Dataset identifier sent to the remote service.
    pub dataset_name: String,
    /// Cache directory of the dataset, relative to the file store root.
    pub cache_name: String,
    /// Remote service URL. `None` makes the layer cache-only.
    pub service_url: Option<String>,
    /// Suffix of cached tile files, without the dot.
    pub format_suffix: String,
    pub tile_width: u32,
    pub tile_height: u32,
    pub num_levels: u32,
    /// Leading levels that carry no imagery.
    pub num_empty_levels: u32,
    /// Coverage of the dataset.
    pub sector: Sector,
    pub level_zero_tile_delta: LatLon,
    pub tile_origin: LatLon,
    /// Expiry time in milliseconds since the UNIX epoch.
    pub expiry_time_ms: Option<u64>,
    pub max_absent_attempts: u32,
    pub min_absent_check_interval_ms: u64,
    /// Lifts permanent absent suppression after this long, if set.
    pub max_absent_try_again_ms: Option<u64>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub stale_request_limit_ms: u64,
    pub network_retrieval_enabled: bool,
    /// RGB colours mapped to full transparency when transcoding.
    pub transparent_colors: Vec<[u8; 3]>,
    /// Block compression used when transcoding into DDS.
    pub dds_compression: DdsFormat,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            dataset_name: String::new(),
            cache_name: String::new(),
            service_url: None,
            format_suffix: DEFAULT_FORMAT_SUFFIX.to_string(),
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            num_levels: 1,
            num_empty_levels: 0,
            sector: Sector::FULL_SPHERE,
            level_zero_tile_delta: LatLon::new(DEFAULT_LEVEL_ZERO_DELTA, DEFAULT_LEVEL_ZERO_DELTA),
            tile_origin: LatLon::new(-90.0, -180.0),
            expiry_time_ms: None,
            max_absent_attempts: DEFAULT_MAX_ABSENT_ATTEMPTS,
            min_absent_check_interval_ms: DEFAULT_MIN_ABSENT_CHECK_INTERVAL_MS,
            max_absent_try_again_ms: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            stale_request_limit_ms: DEFAULT_STALE_REQUEST_LIMIT_MS,
            network_retrieval_enabled: true,
            transparent_colors: Vec::new(),
            dds_compression: DdsFormat::BC1,
        }
    }
}

impl LayerConfig {
    /// Creates a configuration with defaults for everything but the names.
    pub fn new(dataset_name: impl Into<String>, cache_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    /// Sets the cache file suffix; a leading dot is stripped.
    pub fn with_format_suffix(mut self, suffix: &str) -> Self {
        self.format_suffix = suffix.trim_start_matches('.').to_string();
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    /// Sets the number of levels and how many leading levels are empty.
    pub fn with_levels(mut self, num_levels: u32, num_empty_levels: u32) -> Self {
        self.num_levels = num_levels;
        self.num_empty_levels = num_empty_levels;
        self
    }

    pub fn with_sector(mut self, sector: Sector) -> Self {
        self.sector = sector;
        self
    }

    pub fn with_level_zero_tile_delta(mut self, delta: LatLon) -> Self {
        self.level_zero_tile_delta = delta;
        self
    }

    pub fn with_tile_origin(mut self, origin: LatLon) -> Self {
        self.tile_origin = origin;
        self
    }

    pub fn with_expiry_time(mut self, expiry: SystemTime) -> Self {
        self.expiry_time_ms = expiry
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64);
        self
    }

    /// Sets the absent-resource policy.
    pub fn with_absent_policy(mut self, max_attempts: u32, min_check_interval_ms: u64) -> Self {
        self.max_absent_attempts = max_attempts;
        self.min_absent_check_interval_ms = min_check_interval_ms;
        self
    }

    pub fn with_max_absent_try_again_ms(mut self, ms: u64) -> Self {
        self.max_absent_try_again_ms = Some(ms);
        self
    }

    /// Sets connect timeout, read timeout and stale-request limit.
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64, stale_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self.stale_request_limit_ms = stale_ms;
        self
    }

    pub fn with_network_retrieval(mut self, enabled: bool) -> Self {
        self.network_retrieval_enabled = enabled;
        self
    }

    pub fn with_transparent_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        self.transparent_colors = colors;
        self
    }

    pub fn with_dds_compression(mut self, format: DdsFormat) -> Self {
        self.dds_compression = format;
        self
    }

    /// Expiry time, if configured.
    pub fn expiry_time(&self) -> Option<SystemTime> {
        self.expiry_time_ms
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stale_request_limit(&self) -> Duration {
        Duration::from_millis(self.stale_request_limit_ms)
    }

    pub fn min_absent_check_interval(&self) -> Duration {
        Duration::from_millis(self.min_absent_check_interval_ms)
    }

    pub fn max_absent_try_again(&self) -> Option<Duration> {
        self.max_absent_try_again_ms.map(Duration::from_millis)
    }

    /// Relative path of the dataset's metadata file.
    pub fn metadata_path(&self) -> String {
        format!("{}/{}", self.cache_name, METADATA_FILE_NAME)
    }

    /// Checks that the configuration describes a usable layer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset_name.trim().is_empty() {
            return Err(ConfigError::invalid("dataset_name", "must not be empty"));
        }
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::invalid("cache_name", "must not be empty"));
        }
        if self.cache_name.split('/').any(|part| part == "..") {
            return Err(ConfigError::invalid(
                "cache_name",
                "must not leave the cache root",
            ));
        }
        if self.format_suffix.trim_start_matches('.').is_empty() {
            return Err(ConfigError::invalid("format_suffix", "must not be empty"));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ConfigError::invalid(
                "tile_width/tile_height",
                format!("must be positive, got {}x{}", self.tile_width, self.tile_height),
            ));
        }
        if self.num_levels == 0 || self.num_levels > 31 {
            return Err(ConfigError::invalid(
                "num_levels",
                format!("must be between 1 and 31, got {}", self.num_levels),
            ));
        }
        if self.num_empty_levels >= self.num_levels {
            return Err(ConfigError::invalid(
                "num_empty_levels",
                format!(
                    "must be less than num_levels ({}), got {}",
                    self.num_levels, self.num_empty_levels
                ),
            ));
        }
        if !self.sector.is_valid() || self.sector.is_empty() {
            return Err(ConfigError::invalid(
                "sector",
                format!("must be a non-empty range within the globe, got {}", self.sector),
            ));
        }
        let delta = self.level_zero_tile_delta;
        if !(delta.lat.is_finite() && delta.lon.is_finite() && delta.lat > 0.0 && delta.lon > 0.0)
        {
            return Err(ConfigError::invalid(
                "level_zero_tile_delta",
                format!("must be positive, got {}", delta),
            ));
        }
        if !(self.tile_origin.lat.is_finite() && self.tile_origin.lon.is_finite()) {
            return Err(ConfigError::invalid("tile_origin", "must be finite"));
        }
        if self.connect_timeout_ms == 0
            || self.read_timeout_ms == 0
            || self.stale_request_limit_ms == 0
        {
            return Err(ConfigError::invalid("timeouts", "must be positive"));
        }
        if self.max_absent_attempts == 0 {
            return Err(ConfigError::invalid("max_absent_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LayerConfig {
        LayerConfig::new("bmng", "Earth/BMNG")
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.format_suffix, "dds");
        assert_eq!(config.tile_width, 512);
        assert_eq!(config.connect_timeout(), Duration::from_millis(8_000));
        assert_eq!(config.read_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.stale_request_limit(), Duration::from_millis(9_000));
        assert_eq!(config.max_absent_attempts, 3);
        assert!(config.network_retrieval_enabled);
        assert!(config.expiry_time().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = valid()
            .with_format_suffix(".png")
            .with_tile_size(256, 128)
            .with_levels(4, 1)
            .with_timeouts(1, 2, 3)
            .with_network_retrieval(false);
        assert_eq!(config.format_suffix, "png");
        assert_eq!((config.tile_width, config.tile_height), (256, 128));
        assert_eq!((config.num_levels, config.num_empty_levels), (4, 1));
        assert_eq!(config.stale_request_limit_ms, 3);
        assert!(!config.network_retrieval_enabled);
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        assert!(LayerConfig::new("", "cache").validate().is_err());
        assert!(LayerConfig::new("data", " ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_escaping_cache_name() {
        assert!(LayerConfig::new("data", "../elsewhere").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_levels() {
        assert!(valid().with_levels(0, 0).validate().is_err());
        assert!(valid().with_levels(3, 3).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        assert!(valid().with_tile_size(0, 512).validate().is_err());
        assert!(valid()
            .with_level_zero_tile_delta(LatLon::new(0.0, 36.0))
            .validate()
            .is_err());
        assert!(valid()
            .with_sector(Sector::from_degrees(10.0, 0.0, 0.0, 10.0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert!(valid().with_timeouts(0, 1, 1).validate().is_err());
    }

    #[test]
    fn test_expiry_time_round_trip() {
        let expiry = UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        let config = valid().with_expiry_time(expiry);
        assert_eq!(config.expiry_time_ms, Some(1_700_000_000_000));
        assert_eq!(config.expiry_time(), Some(expiry));
    }

    #[test]
    fn test_json_missing_fields_take_defaults() {
        let config: LayerConfig =
            serde_json::from_str(r#"{"dataset_name":"a","cache_name":"b"}"#).unwrap();
        assert_eq!(config.tile_width, DEFAULT_TILE_SIZE);
        assert_eq!(config.sector, Sector::FULL_SPHERE);
    }
}
