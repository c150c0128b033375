//! Latitude/longitude range type.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::LatLon;

/// A closed, axis-aligned latitude/longitude range in degrees.
///
/// Sectors are immutable values. Equality, hashing and ordering are total:
/// they compare the bit patterns of the four bounds (with `-0.0` folded into
/// `0.0` at construction), so sectors can key hash maps and sort
/// deterministically.
///
/// Ordering compares minimum latitude, then minimum longitude, then maximum
/// latitude, then maximum longitude.
///
/// # Example
///
/// ```
/// use globetile::geo::Sector;
///
/// let sector = Sector::from_degrees(0.0, 10.0, 0.0, 20.0);
/// let quads = sector.subdivide();
/// assert_eq!(quads.len(), 4);
/// assert_eq!(quads[0], Sector::from_degrees(0.0, 5.0, 0.0, 10.0));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sector {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl Sector {
    /// The whole globe.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// The empty sector at the origin.
    pub const EMPTY: Sector = Sector {
        min_lat: 0.0,
        max_lat: 0.0,
        min_lon: 0.0,
        max_lon: 0.0,
    };

    /// Creates a sector from its bounds, in the order
    /// `min_lat, max_lat, min_lon, max_lon`.
    pub fn from_degrees(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        // Adding 0.0 folds -0.0 into 0.0 so equal sectors hash equally.
        Self {
            min_lat: min_lat + 0.0,
            max_lat: max_lat + 0.0,
            min_lon: min_lon + 0.0,
            max_lon: max_lon + 0.0,
        }
    }

    /// Minimum latitude.
    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Maximum latitude.
    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Minimum longitude.
    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Maximum longitude.
    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Latitude extent.
    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent.
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// The larger of the two extents.
    pub fn max_extent(&self) -> f64 {
        self.delta_lat().max(self.delta_lon())
    }

    /// Returns true if the bounds are finite, ordered, and on the globe.
    pub fn is_valid(&self) -> bool {
        let finite = self.min_lat.is_finite()
            && self.max_lat.is_finite()
            && self.min_lon.is_finite()
            && self.max_lon.is_finite();
        finite
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
    }

    /// Returns true if the sector has zero area.
    pub fn is_empty(&self) -> bool {
        self.delta_lat() <= 0.0 || self.delta_lon() <= 0.0
    }

    /// Geographic center of the sector.
    pub fn centroid(&self) -> LatLon {
        LatLon::new(
            0.5 * (self.min_lat + self.max_lat),
            0.5 * (self.min_lon + self.max_lon),
        )
    }

    /// The four corners, counter-clockwise from the south-west.
    pub fn corners(&self) -> [LatLon; 4] {
        [
            LatLon::new(self.min_lat, self.min_lon),
            LatLon::new(self.min_lat, self.max_lon),
            LatLon::new(self.max_lat, self.max_lon),
            LatLon::new(self.max_lat, self.min_lon),
        ]
    }

    /// Returns true if the position lies inside or on the boundary.
    pub fn contains(&self, position: &LatLon) -> bool {
        position.lat >= self.min_lat
            && position.lat <= self.max_lat
            && position.lon >= self.min_lon
            && position.lon <= self.max_lon
    }

    /// Returns true if `other` lies entirely inside this sector.
    pub fn contains_sector(&self, other: &Sector) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    /// Returns true if the closed ranges overlap, boundaries included.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    /// Returns true if the interiors overlap (shared edges do not count).
    pub fn intersects_interior(&self, other: &Sector) -> bool {
        self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
            && self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
    }

    /// The overlapping range, or `None` if the sectors are disjoint.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector::from_degrees(
            self.min_lat.max(other.min_lat),
            self.max_lat.min(other.max_lat),
            self.min_lon.max(other.min_lon),
            self.max_lon.min(other.max_lon),
        ))
    }

    /// The smallest sector enclosing both.
    pub fn union(&self, other: &Sector) -> Sector {
        Sector::from_degrees(
            self.min_lat.min(other.min_lat),
            self.max_lat.max(other.max_lat),
            self.min_lon.min(other.min_lon),
            self.max_lon.max(other.max_lon),
        )
    }

    /// The smallest sector enclosing every sector in the iterator.
    pub fn union_all<'a>(sectors: impl IntoIterator<Item = &'a Sector>) -> Option<Sector> {
        sectors.into_iter().fold(None, |acc, s| match acc {
            None => Some(*s),
            Some(u) => Some(u.union(s)),
        })
    }

    /// Splits the sector at its latitude and longitude midpoints.
    ///
    /// Returns the quadrants in the order south-west, south-east, north-west,
    /// north-east. The children share edges and their union is `self`.
    pub fn subdivide(&self) -> [Sector; 4] {
        let mid_lat = 0.5 * (self.min_lat + self.max_lat);
        let mid_lon = 0.5 * (self.min_lon + self.max_lon);
        [
            Sector::from_degrees(self.min_lat, mid_lat, self.min_lon, mid_lon),
            Sector::from_degrees(self.min_lat, mid_lat, mid_lon, self.max_lon),
            Sector::from_degrees(mid_lat, self.max_lat, self.min_lon, mid_lon),
            Sector::from_degrees(mid_lat, self.max_lat, mid_lon, self.max_lon),
        ]
    }

    fn bits(&self) -> [u64; 4] {
        [
            self.min_lat.to_bits(),
            self.min_lon.to_bits(),
            self.max_lat.to_bits(),
            self.max_lon.to_bits(),
        ]
    }
}

impl PartialEq for Sector {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Sector {}

impl Hash for Sector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl PartialOrd for Sector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min_lat
            .total_cmp(&other.min_lat)
            .then_with(|| self.min_lon.total_cmp(&other.min_lon))
            .then_with(|| self.max_lat.total_cmp(&other.max_lat))
            .then_with(|| self.max_lon.total_cmp(&other.max_lon))
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_full_sphere_is_valid() {
        assert!(Sector::FULL_SPHERE.is_valid());
        assert_eq!(Sector::FULL_SPHERE.delta_lat(), 180.0);
        assert_eq!(Sector::FULL_SPHERE.delta_lon(), 360.0);
    }

    #[test]
    fn test_invalid_sector_detected() {
        assert!(!Sector::from_degrees(10.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!Sector::from_degrees(0.0, 95.0, 0.0, 10.0).is_valid());
        assert!(!Sector::from_degrees(0.0, f64::NAN, 0.0, 10.0).is_valid());
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        let a = Sector::from_degrees(-0.0, 1.0, -0.0, 1.0);
        let b = Sector::from_degrees(0.0, 1.0, 0.0, 1.0);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_intersection() {
        let a = Sector::from_degrees(0.0, 10.0, 0.0, 10.0);
        let b = Sector::from_degrees(5.0, 15.0, 5.0, 15.0);
        assert_eq!(
            a.intersection(&b),
            Some(Sector::from_degrees(5.0, 10.0, 5.0, 10.0))
        );

        let c = Sector::from_degrees(20.0, 30.0, 20.0, 30.0);
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_shared_edge_intersects_but_not_interior() {
        let a = Sector::from_degrees(0.0, 10.0, 0.0, 10.0);
        let b = Sector::from_degrees(0.0, 10.0, 10.0, 20.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects_interior(&b));
    }

    #[test]
    fn test_union() {
        let a = Sector::from_degrees(0.0, 10.0, 0.0, 10.0);
        let b = Sector::from_degrees(-5.0, 5.0, 20.0, 30.0);
        assert_eq!(a.union(&b), Sector::from_degrees(-5.0, 10.0, 0.0, 30.0));
    }

    #[test]
    fn test_union_all_empty_is_none() {
        let sectors: Vec<Sector> = Vec::new();
        assert!(Sector::union_all(&sectors).is_none());
    }

    #[test]
    fn test_ordering_is_lat_then_lon() {
        let mut sectors = vec![
            Sector::from_degrees(10.0, 20.0, 0.0, 10.0),
            Sector::from_degrees(0.0, 10.0, 10.0, 20.0),
            Sector::from_degrees(0.0, 10.0, 0.0, 10.0),
        ];
        sectors.sort();
        assert_eq!(sectors[0], Sector::from_degrees(0.0, 10.0, 0.0, 10.0));
        assert_eq!(sectors[1], Sector::from_degrees(0.0, 10.0, 10.0, 20.0));
        assert_eq!(sectors[2], Sector::from_degrees(10.0, 20.0, 0.0, 10.0));
    }

    #[test]
    fn test_centroid() {
        let s = Sector::from_degrees(0.0, 10.0, 20.0, 40.0);
        assert_eq!(s.centroid(), LatLon::new(5.0, 30.0));
    }

    proptest! {
        #[test]
        fn prop_subdivide_reconstructs_parent(
            min_lat in -90.0f64..80.0,
            dlat in 0.001f64..10.0,
            min_lon in -180.0f64..170.0,
            dlon in 0.001f64..10.0,
        ) {
            let parent = Sector::from_degrees(min_lat, min_lat + dlat, min_lon, min_lon + dlon);
            let children = parent.subdivide();

            prop_assert_eq!(children.len(), 4);
            prop_assert_eq!(Sector::union_all(&children), Some(parent));

            for (i, a) in children.iter().enumerate() {
                prop_assert!(parent.contains_sector(a));
                for b in children.iter().skip(i + 1) {
                    prop_assert!(!a.intersects_interior(b));
                }
            }
        }
    }
}
