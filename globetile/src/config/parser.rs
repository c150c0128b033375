//! INI parsing for [`LayerConfig`].
//!
//! All keys live in a `[layer]` section and mirror the struct field names.
//! Compound values are comma separated:
//!
//! ```ini
//! [layer]
//! dataset_name = bmng
//! cache_name = Earth/BMNG
//! service_url = https://tiles.example.com/imagery
//! format_suffix = dds
//! num_levels = 5
//! sector = -90, 90, -180, 180
//! level_zero_tile_delta = 36, 36
//! tile_origin = -90, -180
//! expiry_time = 2024-01-01T00:00:00Z
//! transparent_colors = 000000, ffffff
//! dds_compression = bc1
//! ```

use std::path::Path;
use std::str::FromStr;

use ini::{Ini, Properties};

use crate::geo::{LatLon, Sector};
use crate::texture::DdsFormat;

use super::{ConfigError, LayerConfig};

const SECTION: &str = "layer";

impl LayerConfig {
    /// Loads and validates a configuration from an INI file.
    pub fn load_ini(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let config = parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini =
            Ini::load_from_str(content).map_err(|e| ConfigError::Ini(ini::Error::Parse(e)))?;
        let config = parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }
}

/// Overlays the `[layer]` section onto `LayerConfig::default()`.
fn parse_ini(ini: &Ini) -> Result<LayerConfig, ConfigError> {
    let section = ini
        .section(Some(SECTION))
        .ok_or_else(|| ConfigError::MissingSection(SECTION.to_string()))?;
    let mut config = LayerConfig::default();

    if let Some(v) = non_empty(section, "dataset_name") {
        config.dataset_name = v.to_string();
    }
    if let Some(v) = non_empty(section, "cache_name") {
        config.cache_name = v.to_string();
    }
    if let Some(v) = non_empty(section, "service_url") {
        config.service_url = Some(v.to_string());
    }
    if let Some(v) = non_empty(section, "format_suffix") {
        config.format_suffix = v.trim_start_matches('.').to_string();
    }
    if let Some(v) = non_empty(section, "tile_width") {
        config.tile_width = parse_number(v, "tile_width", "must be a positive integer")?;
    }
    if let Some(v) = non_empty(section, "tile_height") {
        config.tile_height = parse_number(v, "tile_height", "must be a positive integer")?;
    }
    if let Some(v) = non_empty(section, "num_levels") {
        config.num_levels = parse_number(v, "num_levels", "must be a positive integer")?;
    }
    if let Some(v) = non_empty(section, "num_empty_levels") {
        config.num_empty_levels = parse_number(v, "num_empty_levels", "must be an integer")?;
    }
    if let Some(v) = non_empty(section, "sector") {
        let [min_lat, max_lat, min_lon, max_lon] =
            parse_list::<4>(v, "sector", "expected 'min_lat, max_lat, min_lon, max_lon'")?;
        config.sector = Sector::from_degrees(min_lat, max_lat, min_lon, max_lon);
    }
    if let Some(v) = non_empty(section, "level_zero_tile_delta") {
        let [lat, lon] = parse_list::<2>(v, "level_zero_tile_delta", "expected 'lat, lon'")?;
        config.level_zero_tile_delta = LatLon::new(lat, lon);
    }
    if let Some(v) = non_empty(section, "tile_origin") {
        let [lat, lon] = parse_list::<2>(v, "tile_origin", "expected 'lat, lon'")?;
        config.tile_origin = LatLon::new(lat, lon);
    }
    if let Some(v) = non_empty(section, "expiry_time") {
        config.expiry_time_ms = Some(parse_expiry(v)?);
    }
    if let Some(v) = non_empty(section, "max_absent_attempts") {
        config.max_absent_attempts =
            parse_number(v, "max_absent_attempts", "must be a positive integer")?;
    }
    if let Some(v) = non_empty(section, "min_absent_check_interval_ms") {
        config.min_absent_check_interval_ms =
            parse_number(v, "min_absent_check_interval_ms", "must be milliseconds")?;
    }
    if let Some(v) = non_empty(section, "max_absent_try_again_ms") {
        config.max_absent_try_again_ms =
            Some(parse_number(v, "max_absent_try_again_ms", "must be milliseconds")?);
    }
    if let Some(v) = non_empty(section, "connect_timeout_ms") {
        config.connect_timeout_ms = parse_number(v, "connect_timeout_ms", "must be milliseconds")?;
    }
    if let Some(v) = non_empty(section, "read_timeout_ms") {
        config.read_timeout_ms = parse_number(v, "read_timeout_ms", "must be milliseconds")?;
    }
    if let Some(v) = non_empty(section, "stale_request_limit_ms") {
        config.stale_request_limit_ms =
            parse_number(v, "stale_request_limit_ms", "must be milliseconds")?;
    }
    if let Some(v) = non_empty(section, "network_retrieval_enabled") {
        config.network_retrieval_enabled = parse_bool(v, "network_retrieval_enabled")?;
    }
    if let Some(v) = non_empty(section, "transparent_colors") {
        config.transparent_colors = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                parse_color(s)
                    .ok_or_else(|| invalid("transparent_colors", v, "expected rrggbb hex values"))
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = non_empty(section, "dds_compression") {
        config.dds_compression = match v.to_lowercase().as_str() {
            "bc1" => DdsFormat::BC1,
            "bc3" => DdsFormat::BC3,
            _ => return Err(invalid("dds_compression", v, "must be 'bc1' or 'bc3'")),
        };
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: SECTION.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(value: &str, key: &str, reason: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value, reason))
}

fn parse_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(key, value, "must be true or false")),
    }
}

fn parse_list<const N: usize>(
    value: &str,
    key: &str,
    reason: &str,
) -> Result<[f64; N], ConfigError> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid(key, value, reason))?;
    parts.try_into().map_err(|_| invalid(key, value, reason))
}

fn parse_expiry(value: &str) -> Result<u64, ConfigError> {
    let reason = "expected an RFC 3339 timestamp after 1970, e.g. 2024-01-01T00:00:00Z";
    let parsed = chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|_| invalid("expiry_time", value, reason))?;
    u64::try_from(parsed.timestamp_millis()).map_err(|_| invalid("expiry_time", value, reason))
}

fn parse_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
