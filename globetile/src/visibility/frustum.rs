//! View frustum and plane tests.

use glam::{DMat4, DVec3, DVec4};

use super::bounding::BoundingSphere;

/// Result of testing a volume against a plane or frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersect {
    Outside,
    Intersecting,
    Inside,
}

/// A plane `normal · p + distance = 0`; the positive side is inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    /// Builds a plane from `(a, b, c, d)` coefficients, normalising so the
    /// normal has unit length. A zero normal yields a plane that never culls.
    pub fn from_vec4(coefficients: DVec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length <= f64::EPSILON || !length.is_finite() {
            return Self {
                normal: DVec3::ZERO,
                distance: 0.0,
            };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance from the plane; positive on the inside.
    pub fn distance_to(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// Six inward-facing planes: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extracts the clip planes of a combined view-projection matrix
    /// (OpenGL depth range, -w..w).
    pub fn from_view_projection(matrix: DMat4) -> Self {
        let (r0, r1, r2, r3) = (matrix.row(0), matrix.row(1), matrix.row(2), matrix.row(3));
        Self::new([
            Plane::from_vec4(r3 + r0),
            Plane::from_vec4(r3 - r0),
            Plane::from_vec4(r3 + r1),
            Plane::from_vec4(r3 - r1),
            Plane::from_vec4(r3 + r2),
            Plane::from_vec4(r3 - r2),
        ])
    }

    /// Frustum of a perspective camera at `eye` looking at `target`.
    ///
    /// `fov_y` is the vertical field of view in radians; distances are in
    /// the same unit as the positions.
    pub fn from_perspective(
        eye: DVec3,
        target: DVec3,
        up: DVec3,
        fov_y: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let view = DMat4::look_at_rh(eye, target, up);
        let projection = DMat4::perspective_rh_gl(fov_y, aspect, near, far);
        Self::from_view_projection(projection * view)
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn near(&self) -> &Plane {
        &self.planes[4]
    }

    pub fn far(&self) -> &Plane {
        &self.planes[5]
    }

    /// Classifies a sphere against all six planes.
    pub fn compute_visibility(&self, sphere: &BoundingSphere) -> Intersect {
        let mut intersecting = false;
        for plane in &self.planes {
            match sphere.intersect_plane(plane) {
                Intersect::Outside => return Intersect::Outside,
                Intersect::Intersecting => intersecting = true,
                Intersect::Inside => {}
            }
        }
        if intersecting {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }

    /// True unless the sphere lies entirely outside one plane.
    pub fn intersects(&self, sphere: &BoundingSphere) -> bool {
        self.compute_visibility(sphere) != Intersect::Outside
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Frustum {
        // At z = 10 looking down -z, 90 degree field of view, depth 1..100.
        Frustum::from_perspective(
            DVec3::new(0.0, 0.0, 10.0),
            DVec3::ZERO,
            DVec3::Y,
            std::f64::consts::FRAC_PI_2,
            1.0,
            1.0,
            100.0,
        )
    }

    #[test]
    fn test_plane_normalisation() {
        let plane = Plane::from_vec4(DVec4::new(0.0, 2.0, 0.0, -4.0));
        assert_eq!(plane.normal, DVec3::Y);
        assert_eq!(plane.distance, -2.0);
        assert_eq!(plane.distance_to(DVec3::new(5.0, 3.0, 0.0)), 1.0);
    }

    #[test]
    fn test_zero_plane_never_culls() {
        let plane = Plane::from_vec4(DVec4::ZERO);
        let sphere = BoundingSphere::new(DVec3::new(1e9, 0.0, 0.0), 1.0);
        assert_ne!(sphere.intersect_plane(&plane), Intersect::Outside);
    }

    #[test]
    fn test_perspective_contains_points_ahead() {
        let frustum = camera();
        assert!(frustum.contains_point(DVec3::ZERO));
        assert!(frustum.contains_point(DVec3::new(5.0, 5.0, 0.0)));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, 20.0)));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, -100.0)));
        assert!(!frustum.contains_point(DVec3::new(20.0, 0.0, 0.0)));
    }

    #[test]
    fn test_near_and_far_planes() {
        let frustum = camera();
        assert!((frustum.near().distance_to(DVec3::new(0.0, 0.0, 9.0))).abs() < 1e-9);
        assert!((frustum.far().distance_to(DVec3::new(0.0, 0.0, -90.0))).abs() < 1e-9);
    }

    #[test]
    fn test_sphere_classification() {
        let frustum = camera();
        assert_eq!(
            frustum.compute_visibility(&BoundingSphere::new(DVec3::ZERO, 1.0)),
            Intersect::Inside
        );
        assert_eq!(
            frustum.compute_visibility(&BoundingSphere::new(DVec3::new(10.0, 0.0, 0.0), 2.0)),
            Intersect::Intersecting
        );
        assert_eq!(
            frustum.compute_visibility(&BoundingSphere::new(DVec3::new(0.0, 0.0, 30.0), 2.0)),
            Intersect::Outside
        );
        assert!(!frustum.intersects(&BoundingSphere::new(DVec3::new(50.0, 0.0, 0.0), 1.0)));
    }
}
