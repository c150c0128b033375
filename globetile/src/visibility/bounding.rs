//! Bounding spheres.

use glam::DVec3;

use super::frustum::{Intersect, Plane};

/// A sphere enclosing some geometry, used for cheap frustum tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Sphere centred on the centroid of `points` reaching the farthest one.
    pub fn from_points(points: &[DVec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let center = points.iter().fold(DVec3::ZERO, |sum, p| sum + *p) / points.len() as f64;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f64::max);
        Self { center, radius }
    }

    /// The same sphere grown by `amount`.
    pub fn expanded(&self, amount: f64) -> Self {
        Self::new(self.center, self.radius + amount)
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.distance(self.center) <= self.radius
    }

    pub fn intersect_plane(&self, plane: &Plane) -> Intersect {
        let distance = plane.distance_to(self.center);
        if distance < -self.radius {
            Intersect::Outside
        } else if distance < self.radius {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }
}
