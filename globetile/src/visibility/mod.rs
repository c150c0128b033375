//! Sector visibility engine.
//!
//! Decides, once per frame, which sectors of a target size intersect the
//! view frustum. Those sectors drive tile selection and retrieval priority.
//!
//! ```text
//!                       visit(sector)
//!                            │
//!          bounding volume misses frustum? ── yes ──► pruned
//!                            │ no
//!          extent <= target size? ────────── yes ──► visible
//!                            │ no
//!                  subdivide into SW SE NW NE
//!                            │
//!                   visit(each quadrant)
//! ```
//!
//! Bounding volumes come from a [`Globe`] and are memoised in a
//! [`VolumeCache`] keyed by the globe's state.

mod bounding;
mod cache;
mod frustum;
mod globe;
mod tree;

pub use bounding::BoundingSphere;
pub use cache::VolumeCache;
pub use frustum::{Frustum, Intersect, Plane};
pub use globe::{EllipsoidGlobe, Globe, WGS84_EQUATORIAL_RADIUS, WGS84_POLAR_RADIUS};
pub use tree::{
    SectorVisibilityTree, VisibilityError, VisibilityStats, MAX_SECTOR_SIZE, MIN_SECTOR_SIZE,
};
