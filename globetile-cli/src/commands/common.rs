//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use globetile::config::{default_cache_dir, LayerConfig};
use globetile::geo::Sector;
use globetile::layer::{NetworkRetrievable, TileLayer, TilePyramid};
use globetile::store::LocalFileStore;
use globetile::transport::{HttpTransport, TransportConfig};

use crate::error::CliError;

/// Layer and region selection shared by `fetch` and `estimate`.
#[derive(Debug, Args)]
pub struct RegionArgs {
    /// Layer configuration file (.ini, or a cached layer.json)
    pub layer: PathBuf,

    /// Region as MIN_LAT,MAX_LAT,MIN_LON,MAX_LON in degrees (default: whole layer)
    #[arg(long, value_parser = parse_sector, allow_hyphen_values = true)]
    pub sector: Option<Sector>,

    /// Finest tile size to cover, in degrees per tile
    #[arg(long)]
    pub resolution: f64,

    /// Cache directory (default: platform cache directory)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl RegionArgs {
    /// Cache directory from the arguments or the platform default.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Builds the layer and resolves the region.
    ///
    /// The region defaults to the layer's coverage and is clipped to it.
    pub fn load_layer(&self, network: bool) -> Result<(Arc<TileLayer>, Sector), CliError> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(CliError::Config(format!(
                "Resolution must be a positive number of degrees, got {}",
                self.resolution
            )));
        }

        let config = LayerConfig::load(&self.layer)?;
        let transport = HttpTransport::new(TransportConfig::from_layer_config(&config))?;
        let store = LocalFileStore::new(self.cache_dir());
        let layer = TileLayer::new(config, Arc::new(store), Arc::new(transport))?;
        if !network {
            layer.set_network_retrieval_enabled(false);
        }

        let coverage = *layer.level_set().sector();
        let region = match self.sector {
            Some(sector) => sector.intersection(&coverage).ok_or_else(|| {
                CliError::Config(format!(
                    "Region {} lies outside the layer coverage {}",
                    sector, coverage
                ))
            })?,
            None => coverage,
        };
        Ok((Arc::new(layer), region))
    }
}

/// Parse `MIN_LAT,MAX_LAT,MIN_LON,MAX_LON`.
pub fn parse_sector(value: &str) -> Result<Sector, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", value, e))?;

    let [min_lat, max_lat, min_lon, max_lon] = parts[..] else {
        return Err(format!(
            "expected MIN_LAT,MAX_LAT,MIN_LON,MAX_LON, got {} values",
            parts.len()
        ));
    };

    let sector = Sector::from_degrees(min_lat, max_lat, min_lon, max_lon);
    if !sector.is_valid() {
        return Err(format!("'{}' is not a valid sector", value));
    }
    Ok(sector)
}
