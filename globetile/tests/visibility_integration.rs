//! Visibility search feeding tile selection.

use std::sync::Arc;

use glam::DVec3;
use globetile::config::LayerConfig;
use globetile::geo::{LatLon, Sector};
use globetile::layer::{TileLayer, TilePyramid};
use globetile::store::LocalFileStore;
use globetile::transport::{BoxFuture, FetchResponse, Transport, TransportError};
use globetile::visibility::{
    EllipsoidGlobe, Frustum, SectorVisibilityTree, VisibilityError, VolumeCache,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Never reached: these tests only select tiles.
struct NoNetwork;

impl Transport for NoNetwork {
    fn fetch<'a>(
        &'a self,
        _url: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchResponse, TransportError>> {
        Box::pin(async { Err(TransportError::Connect("offline".to_string())) })
    }
}

/// Camera 1.5 radii out along +x looking at the centre of the globe.
fn facing_prime_meridian(globe: &EllipsoidGlobe) -> Frustum {
    let r = globe.equatorial_radius();
    Frustum::from_perspective(
        DVec3::new(1.5 * r, 0.0, 0.0),
        DVec3::ZERO,
        DVec3::Z,
        60f64.to_radians(),
        1.0,
        1.0,
        1.5 * r,
    )
}

#[test]
fn test_visible_sectors_select_nearest_tiles_first() {
    let globe = EllipsoidGlobe::wgs84();
    let mut tree = SectorVisibilityTree::new();
    let visible = tree
        .refresh(&globe, &facing_prime_meridian(&globe), 10.0)
        .unwrap()
        .to_vec();

    assert!(visible.iter().any(|s| s.contains(&LatLon::new(0.5, 0.5))));
    assert!(!visible.iter().any(|s| s.contains(&LatLon::new(0.5, 179.5))));
    assert!(visible.iter().all(|s| s.max_extent() <= 10.0));

    let cache = TempDir::new().unwrap();
    let layer = TileLayer::new(
        LayerConfig::new("bmng", "Earth/BMNG")
            .with_service_url("http://tiles.test/imagery")
            .with_levels(3, 0),
        Arc::new(LocalFileStore::new(cache.path())),
        Arc::new(NoNetwork),
    )
    .unwrap();

    let tiles = layer.tiles_for_view(&visible, LatLon::new(0.0, 0.0), 36.0);
    assert!(!tiles.is_empty());
    assert!(tiles.iter().all(|t| t.level() == 0));
    assert!(tiles
        .windows(2)
        .all(|pair| pair[0].priority() <= pair[1].priority()));

    // The two tiles meeting at the view centre come first.
    assert_eq!(tiles[0].row(), 2);
    assert!((tiles[0].priority() - 18.0).abs() < 1e-9);
}

#[test]
fn test_shared_cache_follows_globe_state() {
    let globe = EllipsoidGlobe::wgs84();
    let frustum = facing_prime_meridian(&globe);
    let cache = Arc::new(VolumeCache::new());

    let mut first = SectorVisibilityTree::new().with_volume_cache(Arc::clone(&cache));
    let visible = first.refresh(&globe, &frustum, 10.0).unwrap().to_vec();
    assert_eq!(first.stats().volumes_computed, first.stats().nodes_visited);

    // A second tree over the same cache reuses every volume.
    let mut second = SectorVisibilityTree::new().with_volume_cache(Arc::clone(&cache));
    assert_eq!(second.refresh(&globe, &frustum, 10.0).unwrap(), visible.as_slice());
    assert_eq!(second.stats().volumes_computed, 0);

    // Raising the terrain changes the state key and forces recomputation.
    let raised = EllipsoidGlobe::wgs84().with_elevation_range(0.0, 8_848.0);
    second.refresh(&raised, &frustum, 10.0).unwrap();
    assert_eq!(second.stats().cache_hits, 0);
    assert_eq!(second.stats().volumes_computed, second.stats().nodes_visited);
}

#[test]
fn test_search_limited_to_region() {
    let globe = EllipsoidGlobe::wgs84();
    let region = Sector::from_degrees(-20.0, 20.0, -20.0, 20.0);
    let mut tree = SectorVisibilityTree::new();

    let visible = tree
        .refresh_sector(&globe, &facing_prime_meridian(&globe), 5.0, &region)
        .unwrap();

    assert_eq!(visible.len(), 64);
    assert!(visible.iter().all(|s| region.contains_sector(s)));
}

#[test]
fn test_rejects_invalid_arguments() {
    let globe = EllipsoidGlobe::wgs84();
    let frustum = facing_prime_meridian(&globe);
    let mut tree = SectorVisibilityTree::new();

    assert_eq!(
        tree.refresh(&globe, &frustum, 0.0).unwrap_err(),
        VisibilityError::InvalidSectorSize(0.0)
    );
    assert_eq!(
        tree.refresh(&globe, &frustum, 400.0).unwrap_err(),
        VisibilityError::InvalidSectorSize(400.0)
    );
}
