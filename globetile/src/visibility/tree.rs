//! Quadtree search for visible sectors.

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::geo::Sector;

use super::bounding::BoundingSphere;
use super::cache::VolumeCache;
use super::frustum::Frustum;
use super::globe::Globe;

/// Smallest accepted target sector size, in degrees.
pub const MIN_SECTOR_SIZE: f64 = 1e-7;

/// Largest accepted target sector size, in degrees.
pub const MAX_SECTOR_SIZE: f64 = 360.0;

/// Invalid arguments to a visibility refresh.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisibilityError {
    #[error("Sector size {0} is outside [1e-7, 360] degrees")]
    InvalidSectorSize(f64),

    #[error("Invalid search sector {0:?}")]
    InvalidSector(Sector),
}

/// Counters from the most recent refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    /// Sectors visited.
    pub nodes_visited: u64,
    /// Bounding volumes computed from the globe.
    pub volumes_computed: u64,
    /// Bounding volumes served from the cache.
    pub cache_hits: u64,
}

/// Finds the sectors of a target size that intersect a view frustum.
///
/// Each refresh walks a quadtree from the search sectors down: a sector
/// whose bounding volume misses the frustum is pruned, a sector no larger
/// than the target size is emitted, anything else is split into its four
/// quadrants. The result is sorted and free of duplicates.
///
/// Bounding volumes are cached across refreshes for as long as the globe's
/// state key is unchanged; the cache can be shared and invalidated from
/// elsewhere through [`volume_cache`](Self::volume_cache).
///
/// # Example
///
/// ```
/// use globetile::visibility::{EllipsoidGlobe, Frustum, SectorVisibilityTree};
/// use glam::DVec3;
///
/// let globe = EllipsoidGlobe::wgs84();
/// let r = globe.equatorial_radius();
/// let frustum = Frustum::from_perspective(
///     DVec3::new(1.5 * r, 0.0, 0.0),
///     DVec3::ZERO,
///     DVec3::Z,
///     60f64.to_radians(),
///     1.0,
///     1.0,
///     1.5 * r,
/// );
///
/// let mut tree = SectorVisibilityTree::new();
/// let visible = tree.refresh(&globe, &frustum, 10.0).unwrap();
/// assert!(!visible.is_empty());
/// assert!(visible.iter().all(|s| s.max_extent() <= 10.0));
/// ```
#[derive(Debug, Default)]
pub struct SectorVisibilityTree {
    cache: Arc<VolumeCache>,
    sectors: Vec<Sector>,
    sector_size: f64,
    stats: VisibilityStats,
}

impl SectorVisibilityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a volume cache shared with other components.
    pub fn with_volume_cache(mut self, cache: Arc<VolumeCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn volume_cache(&self) -> &Arc<VolumeCache> {
        &self.cache
    }

    /// Visible sectors from the last refresh.
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Target size of the last refresh.
    pub fn sector_size(&self) -> f64 {
        self.sector_size
    }

    pub fn stats(&self) -> VisibilityStats {
        self.stats
    }

    /// Forgets the last result.
    pub fn clear(&mut self) {
        self.sectors.clear();
    }

    /// Searches the whole globe.
    pub fn refresh(
        &mut self,
        globe: &dyn Globe,
        frustum: &Frustum,
        sector_size: f64,
    ) -> Result<&[Sector], VisibilityError> {
        self.refresh_sectors(globe, frustum, sector_size, &[Sector::FULL_SPHERE])
    }

    /// Searches within one sector.
    pub fn refresh_sector(
        &mut self,
        globe: &dyn Globe,
        frustum: &Frustum,
        sector_size: f64,
        search: &Sector,
    ) -> Result<&[Sector], VisibilityError> {
        self.refresh_sectors(globe, frustum, sector_size, std::slice::from_ref(search))
    }

    /// Searches within several, possibly overlapping, sectors.
    pub fn refresh_sectors(
        &mut self,
        globe: &dyn Globe,
        frustum: &Frustum,
        sector_size: f64,
        search: &[Sector],
    ) -> Result<&[Sector], VisibilityError> {
        if !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size) {
            return Err(VisibilityError::InvalidSectorSize(sector_size));
        }
        if let Some(bad) = search.iter().find(|s| !s.is_valid()) {
            return Err(VisibilityError::InvalidSector(*bad));
        }

        self.cache.begin_frame(globe.state_key());
        self.sector_size = sector_size;
        self.stats = VisibilityStats::default();

        let mut visible = Vec::new();
        for sector in search {
            self.visit(globe, frustum, sector_size, *sector, &mut visible);
        }
        visible.sort();
        visible.dedup();

        trace!(
            visible = visible.len(),
            visited = self.stats.nodes_visited,
            computed = self.stats.volumes_computed,
            cache_hits = self.stats.cache_hits,
            "Visibility refreshed"
        );
        self.sectors = visible;
        Ok(&self.sectors)
    }

    fn visit(
        &mut self,
        globe: &dyn Globe,
        frustum: &Frustum,
        sector_size: f64,
        sector: Sector,
        visible: &mut Vec<Sector>,
    ) {
        self.stats.nodes_visited += 1;
        if !frustum.intersects(&self.volume(globe, &sector)) {
            return;
        }
        if sector.max_extent() <= sector_size {
            visible.push(sector);
            return;
        }
        for child in sector.subdivide() {
            self.visit(globe, frustum, sector_size, child, visible);
        }
    }

    fn volume(&mut self, globe: &dyn Globe, sector: &Sector) -> BoundingSphere {
        if let Some(volume) = self.cache.get(sector) {
            self.stats.cache_hits += 1;
            return volume;
        }
        let volume = globe.bounding_volume(sector);
        self.stats.volumes_computed += 1;
        self.cache.insert(*sector, volume);
        volume
    }
}
