//! The concrete tiled layer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::absent::{AbsentPolicy, AbsentResourceList};
use crate::config::{ConfigError, LayerConfig};
use crate::pyramid::{LevelSet, TileKey};
use crate::store::{FileStore, PathLocks, StoreError};
use crate::texture::{validate_container, ImageTranscoder};
use crate::transport::Transport;

use super::{Cacheable, NetworkRetrievable, TilePyramid, UrlBuilder};

/// State of a tile in the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedTile {
    /// Present and current.
    Fresh(PathBuf),
    /// Present but written before the level's expiry time.
    Expired(PathBuf),
    /// Not in any store location.
    Missing,
}

/// A tiled dataset: pyramid geometry, cache and remote service in one value.
///
/// Built from a [`LayerConfig`] with the file store and transport injected.
/// Layers sharing a store should share [`PathLocks`] too
/// ([`with_path_locks`](Self::with_path_locks)).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use globetile::config::LayerConfig;
/// use globetile::layer::TileLayer;
/// use globetile::store::LocalFileStore;
/// use globetile::transport::{HttpTransport, TransportConfig};
///
/// let config = LayerConfig::new("bmng", "Earth/BMNG")
///     .with_service_url("https://tiles.example.com/imagery");
/// let transport = HttpTransport::new(TransportConfig::from_layer_config(&config)).unwrap();
/// let layer = TileLayer::new(
///     config,
///     Arc::new(LocalFileStore::new("/tmp/globetile")),
///     Arc::new(transport),
/// )
/// .unwrap();
/// ```
pub struct TileLayer {
    config: LayerConfig,
    levels: LevelSet,
    store: Arc<dyn FileStore>,
    transport: Arc<dyn Transport>,
    absent: Arc<AbsentResourceList<TileKey>>,
    urls: Option<UrlBuilder>,
    transcoder: ImageTranscoder,
    path_locks: Arc<PathLocks>,
    network_enabled: AtomicBool,
    metadata_written: Mutex<bool>,
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("dataset", &self.config.dataset_name)
            .field("cache_name", &self.config.cache_name)
            .field("levels", &self.levels.num_levels())
            .finish_non_exhaustive()
    }
}

impl TileLayer {
    /// Validates the configuration and builds the layer.
    pub fn new(
        config: LayerConfig,
        store: Arc<dyn FileStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let levels = LevelSet::from_config(&config)?;
        let urls = config
            .service_url
            .as_deref()
            .map(|url| UrlBuilder::new(url, &config.dataset_name, &config.format_suffix));

        Ok(Self {
            absent: Arc::new(AbsentResourceList::new(AbsentPolicy::from_config(&config))),
            transcoder: ImageTranscoder::from_layer_config(&config),
            network_enabled: AtomicBool::new(config.network_retrieval_enabled),
            path_locks: Arc::new(PathLocks::new()),
            metadata_written: Mutex::new(false),
            config,
            levels,
            store,
            transport,
            urls,
        })
    }

    /// Shares path locks with other layers over the same store.
    pub fn with_path_locks(mut self, locks: Arc<PathLocks>) -> Self {
        self.path_locks = locks;
        self
    }

    /// A copy of this layer caching into `store`.
    ///
    /// The copy shares the transport, path locks and absent list, so a tile
    /// known to be unavailable is not requested again through the copy.
    pub fn with_file_store(&self, store: Arc<dyn FileStore>) -> Result<TileLayer, ConfigError> {
        let mut layer = TileLayer::new(self.config.clone(), store, Arc::clone(&self.transport))?
            .with_path_locks(Arc::clone(&self.path_locks));
        layer.absent = Arc::clone(&self.absent);
        layer.set_network_retrieval_enabled(self.is_network_retrieval_enabled());
        for (copy, level) in layer.levels.levels().iter().zip(self.levels.levels()) {
            copy.set_expiry_time(level.expiry_time());
        }
        Ok(layer)
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.config.dataset_name
    }

    /// Cache directory name; unique per dataset within a store.
    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn path_locks(&self) -> &Arc<PathLocks> {
        &self.path_locks
    }

    pub fn transcoder(&self) -> &ImageTranscoder {
        &self.transcoder
    }

    /// Format suffix of the tile's level.
    pub fn format_suffix(&self) -> &str {
        &self.config.format_suffix
    }

    /// Refreshes the expiry time of every level.
    pub fn set_expiry_time(&self, expiry: Option<SystemTime>) {
        self.levels.set_expiry_time(expiry);
    }

    /// Looks the tile up in the store and checks it against the level's
    /// expiry. Blocking.
    pub fn check_cache(&self, key: &TileKey) -> CachedTile {
        let (Some(level), Some(path)) = (self.levels.level(key.level()), self.cache_path(key))
        else {
            return CachedTile::Missing;
        };
        let Some(location) = self.store.find_file(&path, true) else {
            return CachedTile::Missing;
        };

        let modified = std::fs::metadata(&location).and_then(|m| m.modified());
        match modified {
            Ok(modified) if level.is_expired(modified) => CachedTile::Expired(location),
            _ => CachedTile::Fresh(location),
        }
    }

    /// Reads a cached tile.
    ///
    /// Returns `Ok(None)` when the tile is not cached. A file that fails
    /// container validation is deleted and the tile marked absent, so the
    /// next request fetches it again instead of failing to decode it again.
    pub async fn read_cached_tile(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        let Some(path) = self.cache_path(key) else {
            return Ok(None);
        };
        let Some(location) = self.store.find_file(&path, true) else {
            return Ok(None);
        };

        let _guard = self.path_locks.lock(&location).await;
        let store = Arc::clone(&self.store);
        let suffix = self.config.format_suffix.clone();
        let read_location = location.clone();

        let read = tokio::task::spawn_blocking(move || -> Result<ReadOutcome, StoreError> {
            let bytes = match std::fs::read(&read_location) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(ReadOutcome::Missing)
                }
                Err(e) => return Err(StoreError::io(&read_location, e)),
            };
            match validate_container(&suffix, &bytes) {
                Ok(()) => Ok(ReadOutcome::Valid(Bytes::from(bytes))),
                Err(reason) => {
                    store.remove_file(&read_location)?;
                    Ok(ReadOutcome::Corrupt(reason.to_string()))
                }
            }
        })
        .await
        .map_err(|e| StoreError::io(&location, std::io::Error::other(e.to_string())))??;

        match read {
            ReadOutcome::Valid(bytes) => {
                debug!(tile = %key, path = %location.display(), "Cache hit");
                Ok(Some(bytes))
            }
            ReadOutcome::Missing => Ok(None),
            ReadOutcome::Corrupt(reason) => {
                warn!(
                    tile = %key,
                    path = %location.display(),
                    reason = %reason,
                    "Deleted corrupt cache entry"
                );
                self.absent.mark_absent(*key);
                Ok(None)
            }
        }
    }

    /// Writes the dataset's metadata file if it does not exist yet.
    ///
    /// Guarded so concurrent workers write it at most once per layer.
    /// Returns true if this call wrote the file.
    pub async fn ensure_metadata(&self) -> Result<bool, ConfigError> {
        let mut written = self.metadata_written.lock().await;
        if *written {
            return Ok(false);
        }

        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let created = tokio::task::spawn_blocking(move || -> Result<bool, ConfigError> {
            let path = config.metadata_path();
            if store.find_file(&path, false).is_some() {
                return Ok(false);
            }
            let location = store.new_file(&path)?;
            config.write_metadata(&location)?;
            Ok(true)
        })
        .await
        .map_err(|e| ConfigError::Io(std::io::Error::other(e.to_string())))??;

        if created {
            info!(dataset = %self.config.dataset_name, "Wrote layer metadata");
        }
        *written = true;
        Ok(created)
    }
}

enum ReadOutcome {
    Valid(Bytes),
    Missing,
    Corrupt(String),
}

impl TilePyramid for TileLayer {
    fn level_set(&self) -> &LevelSet {
        &self.levels
    }
}

impl Cacheable for TileLayer {
    fn file_store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    fn cache_path(&self, key: &TileKey) -> Option<String> {
        self.levels.tile_path(key)
    }

    fn absent_tiles(&self) -> &AbsentResourceList<TileKey> {
        &self.absent
    }
}

impl NetworkRetrievable for TileLayer {
    fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn resource_url(&self, key: &TileKey) -> Option<String> {
        self.urls.as_ref().map(|urls| urls.url_for(key))
    }

    fn is_network_retrieval_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::Acquire)
    }

    fn set_network_retrieval_enabled(&self, enabled: bool) {
        self.network_enabled.store(enabled, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{LatLon, Sector};
    use crate::store::LocalFileStore;
    use crate::texture::{DdsFormat, DdsHeader};
    use crate::transport::mock::MockTransport;
    use std::time::Duration;
    use tempfile::TempDir;

    fn layer(dir: &TempDir, config: LayerConfig) -> TileLayer {
        TileLayer::new(
            config,
            Arc::new(LocalFileStore::new(dir.path())),
            Arc::new(MockTransport::new()),
        )
        .unwrap()
    }

    fn config() -> LayerConfig {
        LayerConfig::new("bmng", "Earth/BMNG")
            .with_service_url("http://tiles.test/imagery")
            .with_levels(3, 0)
            .with_tile_size(4, 4)
    }

    fn valid_dds() -> Vec<u8> {
        let mut bytes = DdsHeader::new(4, 4, 1, DdsFormat::BC1).to_bytes();
        bytes.extend_from_slice(&[0u8; 8]);
        bytes
    }

    fn write(dir: &TempDir, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let result = TileLayer::new(
            LayerConfig::new("", "x"),
            Arc::new(LocalFileStore::new(dir.path())),
            Arc::new(MockTransport::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_url_and_cache_path() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        let key = TileKey::new(1, 2, 3);

        assert_eq!(
            layer.resource_url(&key).as_deref(),
            Some("http://tiles.test/imagery?T=bmng&L=1&X=3&Y=2")
        );
        assert_eq!(
            layer.cache_path(&key).as_deref(),
            Some("Earth/BMNG/1/2/1_2_3.dds")
        );
        assert!(layer.cache_path(&TileKey::new(9, 0, 0)).is_none());
    }

    #[test]
    fn test_cache_only_layer_has_no_url() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, LayerConfig::new("bmng", "Earth/BMNG"));
        assert!(layer.resource_url(&TileKey::new(0, 0, 0)).is_none());
    }

    #[test]
    fn test_with_file_store_switches_cache() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let layer = layer(&dir, config().with_network_retrieval(false));
        write(&other, "Earth/BMNG/0/0/0_0_0.dds", &valid_dds());

        let copy = layer
            .with_file_store(Arc::new(LocalFileStore::new(other.path())))
            .unwrap();

        assert!(copy.is_tile_cached(&TileKey::new(0, 0, 0)));
        assert!(!layer.is_tile_cached(&TileKey::new(0, 0, 0)));
        assert!(!copy.is_network_retrieval_enabled());
        assert!(Arc::ptr_eq(copy.path_locks(), layer.path_locks()));
    }

    #[test]
    fn test_with_file_store_shares_absent_list() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        let key = TileKey::new(1, 0, 0);
        layer.absent_tiles().mark_absent(key);

        let copy = layer
            .with_file_store(Arc::new(LocalFileStore::new(other.path())))
            .unwrap();
        assert!(copy.absent_tiles().is_absent(&key));

        let later = TileKey::new(1, 0, 1);
        copy.absent_tiles().mark_absent(later);
        assert!(layer.absent_tiles().is_absent(&later));
    }

    #[test]
    fn test_network_toggle() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config().with_network_retrieval(false));
        assert!(!layer.is_network_retrieval_enabled());
        layer.set_network_retrieval_enabled(true);
        assert!(layer.is_network_retrieval_enabled());
    }

    #[test]
    fn test_tiles_for_view_ranks_by_distance() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config().with_level_zero_tile_delta(LatLon::new(36.0, 36.0)));

        let sector = Sector::from_degrees(0.0, 18.0, 0.0, 36.0);
        let tiles = layer.tiles_for_view(&[sector, sector], LatLon::new(4.5, 4.5), 9.0);

        // Level 2: 9 degree tiles, 2 rows × 4 columns, duplicates removed.
        assert_eq!(tiles.len(), 8);
        assert!(tiles.iter().all(|t| t.level() == 2));
        assert_eq!(*tiles[0].sector(), Sector::from_degrees(0.0, 9.0, 0.0, 9.0));
        assert!(tiles.windows(2).all(|w| w[0].priority() <= w[1].priority()));
    }

    #[test]
    fn test_tiles_for_view_skips_empty_levels() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config().with_levels(3, 2));
        let tiles = layer.tiles_for_view(&[Sector::FULL_SPHERE], LatLon::new(0.0, 0.0), 90.0);
        assert!(tiles.iter().all(|t| t.level() == 2));
    }

    #[test]
    fn test_check_cache_states() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        let key = TileKey::new(0, 1, 1);
        assert_eq!(layer.check_cache(&key), CachedTile::Missing);

        let path = write(&dir, "Earth/BMNG/0/1/0_1_1.dds", &valid_dds());
        assert_eq!(layer.check_cache(&key), CachedTile::Fresh(path.clone()));

        // File older than a past expiry time.
        let old = SystemTime::now() - Duration::from_secs(3600);
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(old)).unwrap();
        layer.set_expiry_time(Some(SystemTime::now() - Duration::from_secs(60)));
        assert_eq!(layer.check_cache(&key), CachedTile::Expired(path));
    }

    #[tokio::test]
    async fn test_read_cached_tile_valid() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        write(&dir, "Earth/BMNG/0/0/0_0_0.dds", &valid_dds());

        let bytes = layer.read_cached_tile(&TileKey::new(0, 0, 0)).await.unwrap();
        assert_eq!(bytes.map(|b| b.len()), Some(136));
        assert!(layer.is_tile_cached(&TileKey::new(0, 0, 0)));
    }

    #[tokio::test]
    async fn test_read_cached_tile_deletes_corrupt_entry() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        let key = TileKey::new(0, 0, 0);
        let path = write(&dir, "Earth/BMNG/0/0/0_0_0.dds", b"<html>oops</html>");

        assert_eq!(layer.read_cached_tile(&key).await.unwrap(), None);
        assert!(!path.exists());
        assert!(layer.absent_tiles().is_absent(&key));
    }

    #[tokio::test]
    async fn test_read_cached_tile_missing() {
        let dir = TempDir::new().unwrap();
        let layer = layer(&dir, config());
        let key = TileKey::new(0, 0, 0);
        assert_eq!(layer.read_cached_tile(&key).await.unwrap(), None);
        assert!(!layer.absent_tiles().is_absent(&key));
    }

    #[tokio::test]
    async fn test_ensure_metadata_writes_once() {
        let dir = TempDir::new().unwrap();
        let layer = Arc::new(layer(&dir, config()));

        let results = futures::future::join_all((0..4).map(|_| {
            let layer = Arc::clone(&layer);
            async move { layer.ensure_metadata().await.unwrap() }
        }))
        .await;

        assert_eq!(results.iter().filter(|&&created| created).count(), 1);
        let path = dir.path().join("Earth/BMNG/layer.json");
        assert_eq!(LayerConfig::read_metadata(&path).unwrap(), *layer.config());
    }

    #[tokio::test]
    async fn test_ensure_metadata_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "Earth/BMNG/layer.json", b"{}");
        let layer = layer(&dir, config());

        assert!(!layer.ensure_metadata().await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }
}
