//! Globetile - tile pyramid retrieval and visibility for globe imagery
//!
//! A raster dataset draped over a globe is split into a pyramid of fixed-size
//! tiles. This library decides which tiles a view needs, fetches them in
//! priority order, and keeps them in a local cache so they are downloaded
//! once.
//!
//! ```text
//!   Frustum ──► visibility ──► visible sectors
//!                                   │
//!                                   ▼
//!                 layer::TilePyramid::tiles_for_view (ranked by distance)
//!                                   │
//!                                   ▼
//!                 retrieval::RetrievalService ──► store (local cache)
//!                     │        │
//!                     │        └── transport (http, https, file)
//!                     └── absent (suppress futile requests)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use globetile::config::LayerConfig;
//! use globetile::layer::{TileLayer, TilePyramid};
//! use globetile::retrieval::{RetrievalConfig, RetrievalService};
//! use globetile::store::LocalFileStore;
//! use globetile::transport::{HttpTransport, TransportConfig};
//! use globetile::geo::{LatLon, Sector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LayerConfig::load(std::path::Path::new("bmng.ini"))?;
//! let transport = HttpTransport::new(TransportConfig::from_layer_config(&config))?;
//! let layer = Arc::new(TileLayer::new(
//!     config,
//!     Arc::new(LocalFileStore::new(globetile::config::default_cache_dir())),
//!     Arc::new(transport),
//! )?);
//!
//! let service = RetrievalService::new(RetrievalConfig::default());
//! service.start();
//! let view = Sector::from_degrees(40.0, 50.0, 0.0, 10.0);
//! for tile in layer.tiles_for_view(&[view], LatLon::new(45.0, 5.0), 1.0) {
//!     service.submit(tile, Arc::clone(&layer));
//! }
//! # Ok(())
//! # }
//! ```

pub mod absent;
pub mod config;
pub mod geo;
pub mod layer;
pub mod logging;
pub mod pyramid;
pub mod retrieval;
pub mod store;
pub mod texture;
pub mod transport;
pub mod visibility;

/// Version of the library and CLI, shared across the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
