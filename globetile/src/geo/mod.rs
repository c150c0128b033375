//! Geographic primitives.
//!
//! Provides the [`LatLon`] position and the [`Sector`] range type used by the
//! tile pyramid and the visibility engine. All angles are in decimal degrees.

mod sector;

pub use sector::Sector;

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters, used for great-circle distances.
pub const EARTH_MEAN_RADIUS: f64 = 6_371_008.8;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees (positive north).
    pub lat: f64,
    /// Longitude in degrees (positive east).
    pub lon: f64,
}

impl LatLon {
    /// Creates a new position.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle angular distance to `other`, in degrees.
    ///
    /// Uses the haversine formula, which stays well conditioned for the
    /// small distances typical of neighbouring tiles.
    pub fn angular_distance(&self, other: &LatLon) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        c.to_degrees()
    }

    /// Great-circle distance to `other` in meters on a spherical earth.
    pub fn distance_meters(&self, other: &LatLon) -> f64 {
        self.angular_distance(other).to_radians() * EARTH_MEAN_RADIUS
    }
}

impl std::fmt::Display for LatLon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}
