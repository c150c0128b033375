//! End-to-end retrieval tests against scripted and file-backed transports.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use globetile::config::{LayerConfig, METADATA_FILE_NAME};
use globetile::geo::Sector;
use globetile::layer::{Cacheable, NetworkRetrievable, TileLayer, TilePyramid};
use globetile::pyramid::TileKey;
use globetile::retrieval::{
    BulkRetriever, RetrievalConfig, RetrievalEvent, RetrievalOutcome, RetrievalService,
    SkipReason, TileFetcher,
};
use globetile::store::{FileStore, LocalFileStore};
use globetile::texture::{DdsFormat, DdsHeader};
use globetile::transport::{
    BoxFuture, FetchResponse, HttpTransport, Transport, TransportConfig, TransportError,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

/// Serves DDS tiles for scripted URLs and 404 for everything else.
#[derive(Default)]
struct TileServer {
    tiles: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl TileServer {
    fn serve(&self, url: &str, body: Vec<u8>) {
        self.tiles.lock().insert(url.to_string(), body);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for TileServer {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchResponse, TransportError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            Ok(match self.tiles.lock().get(url) {
                Some(body) => FetchResponse::new(200, Some("image/dds"), body.clone()),
                None => FetchResponse::new(404, Some("text/html"), "<html>Not Found</html>"),
            })
        })
    }
}

fn dds_tile() -> Vec<u8> {
    let mut bytes = DdsHeader::new(4, 4, 1, DdsFormat::BC1).to_bytes();
    bytes.extend_from_slice(&[0u8; 8]);
    bytes
}

fn config(service: &str) -> LayerConfig {
    LayerConfig::new("bmng", "Earth/BMNG")
        .with_service_url(service)
        .with_levels(3, 0)
        .with_tile_size(4, 4)
}

fn url(key: TileKey) -> String {
    format!(
        "http://tiles.test/imagery?T=bmng&L={}&X={}&Y={}",
        key.level(),
        key.col(),
        key.row()
    )
}

fn layer_over(cache: &Path, transport: Arc<dyn Transport>) -> Arc<TileLayer> {
    Arc::new(
        TileLayer::new(
            config("http://tiles.test/imagery"),
            Arc::new(LocalFileStore::new(cache)),
            transport,
        )
        .unwrap(),
    )
}

async fn next_event(events: &mut broadcast::Receiver<RetrievalEvent>) -> RetrievalEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_service_caches_view_tiles() {
    let cache = TempDir::new().unwrap();
    let server = Arc::new(TileServer::default());
    let layer = layer_over(cache.path(), server.clone());

    // Rows 2 and 3 of column 5 at level 0.
    let view = Sector::from_degrees(-10.0, 50.0, 10.0, 30.0);
    let tiles = layer.level_set().tiles_in_sector(0, &view);
    assert_eq!(tiles.len(), 2);
    for tile in &tiles {
        server.serve(&url(tile.key()), dds_tile());
    }

    let service = RetrievalService::new(RetrievalConfig::default().with_pool_size(2));
    let mut events = service.subscribe();
    service.start();
    for tile in tiles {
        assert!(service.submit(tile, layer.clone()).is_accepted());
    }

    let mut ready = Vec::new();
    for _ in 0..2 {
        match next_event(&mut events).await {
            RetrievalEvent::TileReady { key, location, .. } => {
                assert!(location.exists());
                ready.push(key);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    ready.sort();
    assert_eq!(ready, vec![TileKey::new(0, 2, 5), TileKey::new(0, 3, 5)]);

    assert!(cache.path().join("Earth/BMNG/0/2/0_2_5.dds").exists());
    assert!(cache.path().join("Earth/BMNG/0/3/0_3_5.dds").exists());
    assert!(cache
        .path()
        .join("Earth/BMNG")
        .join(METADATA_FILE_NAME)
        .exists());

    // The cached metadata reopens the layer without the original file.
    let reopened = LayerConfig::load(&cache.path().join("Earth/BMNG/layer.json")).unwrap();
    assert_eq!(reopened.dataset_name, "bmng");

    service.shutdown().await;
}

#[tokio::test]
async fn test_service_reports_missing_tile_once() {
    let cache = TempDir::new().unwrap();
    let server = Arc::new(TileServer::default());
    let layer = layer_over(cache.path(), server.clone());
    let tile = layer.level_set().tile(TileKey::new(1, 4, 4));

    let service = RetrievalService::new(RetrievalConfig::default());
    let mut events = service.subscribe();
    service.start();
    service.submit(tile.clone(), layer.clone());

    match next_event(&mut events).await {
        RetrievalEvent::TileAbsent { key, .. } => assert_eq!(key, TileKey::new(1, 4, 4)),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(layer.absent_tiles().is_absent(&TileKey::new(1, 4, 4)));

    // A second request is suppressed without touching the network.
    let outcome = TileFetcher::new(CancellationToken::new())
        .retrieve(&tile, &layer)
        .await;
    assert!(matches!(outcome, RetrievalOutcome::Skipped(SkipReason::Absent)));
    assert_eq!(server.calls(), 1);

    service.shutdown().await;
}

// ============================================================================
// File-backed service
// ============================================================================

#[tokio::test]
async fn test_file_service_mirrors_into_cache() {
    let mirror = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    std::fs::create_dir_all(mirror.path().join("0/3")).unwrap();
    std::fs::write(mirror.path().join("0/3/5.dds"), dds_tile()).unwrap();

    let service = format!("file://{}/{{level}}/{{row}}/{{col}}.dds", mirror.path().display());
    let transport = HttpTransport::new(TransportConfig::default()).unwrap();
    let layer = Arc::new(
        TileLayer::new(
            config(&service),
            Arc::new(LocalFileStore::new(cache.path())),
            Arc::new(transport),
        )
        .unwrap(),
    );
    let fetcher = TileFetcher::new(CancellationToken::new());

    let present = layer.level_set().tile(TileKey::new(0, 3, 5));
    match fetcher.retrieve(&present, &layer).await {
        RetrievalOutcome::Downloaded {
            bytes, transcoded, ..
        } => {
            assert_eq!(bytes, dds_tile().len());
            assert!(!transcoded);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        std::fs::read(cache.path().join("Earth/BMNG/0/3/0_3_5.dds")).unwrap(),
        dds_tile()
    );

    let missing = layer.level_set().tile(TileKey::new(0, 2, 5));
    assert!(matches!(
        fetcher.retrieve(&missing, &layer).await,
        RetrievalOutcome::Absent(_)
    ));
    assert!(!layer.is_tile_cached(&TileKey::new(0, 2, 5)));
}

// ============================================================================
// Bulk
// ============================================================================

#[tokio::test]
async fn test_bulk_then_offline_reads_from_cache() {
    let cache = TempDir::new().unwrap();
    let server = Arc::new(TileServer::default());
    let layer = layer_over(cache.path(), server.clone());
    let region = Sector::from_degrees(18.0, 54.0, 0.0, 36.0);
    let bulk = BulkRetriever::new(CancellationToken::new()).with_concurrency(2);

    let tiles = bulk.tiles_for_region(&layer, &region, 18.0);
    for tile in &tiles {
        server.serve(&url(tile.key()), dds_tile());
    }
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(cache.path()));

    let before = bulk.estimate_missing_bytes(&layer, &region, 18.0, store.as_ref());
    assert_eq!(before.missing_tiles, before.total_tiles);
    assert!(before.estimated_bytes > 0);

    let summary = bulk
        .make_local(&layer, &region, 18.0, store.clone())
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.downloaded, tiles.len() as u64);

    let after = bulk.estimate_missing_bytes(&layer, &region, 18.0, store.as_ref());
    assert_eq!(after.missing_tiles, 0);
    assert_eq!(after.estimated_bytes, 0);

    // With the network off every tile still resolves from the cache.
    layer.set_network_retrieval_enabled(false);
    let calls = server.calls();
    let again = bulk.make_local(&layer, &region, 18.0, store).await.unwrap();
    assert_eq!(again.already_local, tiles.len() as u64);
    assert_eq!(server.calls(), calls);
}
