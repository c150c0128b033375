//! Globe shape used to bound sectors in 3D.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use glam::DVec3;

use crate::geo::Sector;

use super::bounding::BoundingSphere;

/// WGS84 equatorial radius in meters.
pub const WGS84_EQUATORIAL_RADIUS: f64 = 6_378_137.0;

/// WGS84 polar radius in meters.
pub const WGS84_POLAR_RADIUS: f64 = 6_356_752.314_245;

/// Sectors wider than this are bounded by the whole globe.
const MAX_SAMPLED_EXTENT: f64 = 90.0;

/// The surface sectors are draped over.
pub trait Globe: Send + Sync {
    /// Identifies the globe's current shape. Bounding volumes computed under
    /// one key are invalid under another.
    fn state_key(&self) -> u64;

    /// A volume enclosing every point of `sector` between the globe's
    /// minimum and maximum elevation.
    fn bounding_volume(&self, sector: &Sector) -> BoundingSphere;
}

/// An ellipsoid with an elevation range and vertical exaggeration.
///
/// Earth-centred, earth-fixed coordinates: +x through (0°, 0°), +z through
/// the north pole.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidGlobe {
    equatorial_radius: f64,
    polar_radius: f64,
    min_elevation: f64,
    max_elevation: f64,
    vertical_exaggeration: f64,
}

impl Default for EllipsoidGlobe {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl EllipsoidGlobe {
    pub fn new(equatorial_radius: f64, polar_radius: f64) -> Self {
        Self {
            equatorial_radius,
            polar_radius,
            min_elevation: 0.0,
            max_elevation: 0.0,
            vertical_exaggeration: 1.0,
        }
    }

    pub fn wgs84() -> Self {
        Self::new(WGS84_EQUATORIAL_RADIUS, WGS84_POLAR_RADIUS)
    }

    /// A sphere of the given radius.
    pub fn sphere(radius: f64) -> Self {
        Self::new(radius, radius)
    }

    /// Lowest and highest terrain elevation in meters.
    pub fn with_elevation_range(mut self, min: f64, max: f64) -> Self {
        self.min_elevation = min.min(max);
        self.max_elevation = max.max(min);
        self
    }

    pub fn with_vertical_exaggeration(mut self, exaggeration: f64) -> Self {
        self.vertical_exaggeration = exaggeration;
        self
    }

    pub fn equatorial_radius(&self) -> f64 {
        self.equatorial_radius
    }

    pub fn polar_radius(&self) -> f64 {
        self.polar_radius
    }

    /// Earth-centred cartesian position of a geodetic point.
    pub fn cartesian(&self, lat: f64, lon: f64, elevation: f64) -> DVec3 {
        let a = self.equatorial_radius;
        let e2 = 1.0 - (self.polar_radius * self.polar_radius) / (a * a);
        let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
        let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        DVec3::new(
            (n + elevation) * cos_lat * cos_lon,
            (n + elevation) * cos_lat * sin_lon,
            (n * (1.0 - e2) + elevation) * sin_lat,
        )
    }

    fn max_radius(&self) -> f64 {
        self.equatorial_radius.max(self.polar_radius)
            + (self.max_elevation * self.vertical_exaggeration).max(0.0)
    }
}

impl Globe for EllipsoidGlobe {
    fn state_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for value in [
            self.equatorial_radius,
            self.polar_radius,
            self.min_elevation,
            self.max_elevation,
            self.vertical_exaggeration,
        ] {
            value.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Samples a 3×3 grid at both elevation extremes and pads the sphere by
    /// the chord a surface point can lie from its nearest sample.
    fn bounding_volume(&self, sector: &Sector) -> BoundingSphere {
        let max_radius = self.max_radius();
        if sector.max_extent() > MAX_SAMPLED_EXTENT {
            return BoundingSphere::new(DVec3::ZERO, max_radius);
        }

        let low = self.min_elevation * self.vertical_exaggeration;
        let high = self.max_elevation * self.vertical_exaggeration;
        let lats = [sector.min_lat(), sector.centroid().lat, sector.max_lat()];
        let lons = [sector.min_lon(), sector.centroid().lon, sector.max_lon()];

        let mut points = Vec::with_capacity(18);
        for lat in lats {
            for lon in lons {
                points.push(self.cartesian(lat, lon, low));
                points.push(self.cartesian(lat, lon, high));
            }
        }

        let spacing = (sector.max_extent() / 2.0).to_radians();
        let reach = spacing * std::f64::consts::FRAC_1_SQRT_2;
        let chord = 2.0 * max_radius * (reach / 2.0).sin();
        BoundingSphere::from_points(&points).expanded(chord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cartesian_axes() {
        let globe = EllipsoidGlobe::wgs84();
        let x = globe.cartesian(0.0, 0.0, 0.0);
        assert!((x - DVec3::new(WGS84_EQUATORIAL_RADIUS, 0.0, 0.0)).length() < 1e-6);
        let y = globe.cartesian(0.0, 90.0, 100.0);
        assert!((y - DVec3::new(0.0, WGS84_EQUATORIAL_RADIUS + 100.0, 0.0)).length() < 1e-6);
        let z = globe.cartesian(90.0, 0.0, 0.0);
        assert!((z.z - WGS84_POLAR_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn test_wide_sector_bounded_by_whole_globe() {
        let globe = EllipsoidGlobe::sphere(1_000.0).with_elevation_range(0.0, 10.0);
        let sphere = globe.bounding_volume(&Sector::FULL_SPHERE);
        assert_eq!(sphere, BoundingSphere::new(DVec3::ZERO, 1_010.0));
    }

    #[test]
    fn test_state_key_tracks_shape() {
        let globe = EllipsoidGlobe::wgs84();
        assert_eq!(globe.state_key(), EllipsoidGlobe::wgs84().state_key());
        assert_ne!(
            globe.state_key(),
            globe.clone().with_vertical_exaggeration(2.0).state_key()
        );
        assert_ne!(
            globe.state_key(),
            globe.clone().with_elevation_range(-400.0, 8_848.0).state_key()
        );
    }

    proptest! {
        #[test]
        fn prop_volume_encloses_sector(
            min_lat in -89.0f64..80.0,
            min_lon in -179.0f64..170.0,
            size in 0.01f64..9.0,
            u in 0.0f64..1.0,
            v in 0.0f64..1.0,
            h in 0.0f64..1.0,
        ) {
            let globe = EllipsoidGlobe::wgs84().with_elevation_range(-500.0, 9_000.0);
            let sector = Sector::from_degrees(
                min_lat,
                (min_lat + size).min(90.0),
                min_lon,
                min_lon + size,
            );
            let sphere = globe.bounding_volume(&sector);
            let point = globe.cartesian(
                sector.min_lat() + u * sector.delta_lat(),
                sector.min_lon() + v * sector.delta_lon(),
                -500.0 + h * 9_500.0,
            );
            prop_assert!(sphere.center.distance(point) <= sphere.radius + 1e-6);
        }
    }
}
