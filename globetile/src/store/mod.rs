//! Path-addressed local file store.
//!
//! The retrieval pipeline talks to the on-disk cache only through the
//! [`FileStore`] contract: find, create, remove, list. Paths handed to the
//! store are relative and use `/` separators (e.g.
//! `Earth/BMNG/2/10/2_10_20.dds`); the store resolves them against its
//! locations.
//!
//! ```text
//!                 find_file(rel, look_in_all)
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!        ▼                 ▼                  ▼
//!   write location    read location 1 ... read location n
//!   (always)          (only when look_in_all = true)
//! ```
//!
//! Writes always land in the write location. Concurrent writers to the same
//! file are serialised with [`PathLocks`]; [`write_atomic`] guarantees a file
//! is either absent or complete.

mod local;
mod lock;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::LocalFileStore;
pub use lock::{PathGuard, PathLocks};

/// Errors returned by file store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relative path was absolute or escaped the store root.
    #[error("Invalid store path '{0}'")]
    InvalidPath(String),

    /// A list filter was not a valid glob pattern.
    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Contract of the persistent tile cache.
///
/// Implementations must be safe to share between worker tasks. Methods are
/// blocking; async callers run them on the blocking pool.
pub trait FileStore: Send + Sync {
    /// Locates `path`, returning its absolute location if the file exists.
    ///
    /// With `look_in_all_locations` false only the write location is
    /// consulted.
    fn find_file(&self, path: &str, look_in_all_locations: bool) -> Option<PathBuf>;

    /// Returns the absolute location a new file at `path` should be written
    /// to, creating missing parent directories.
    fn new_file(&self, path: &str) -> Result<PathBuf, StoreError>;

    /// Deletes a file previously returned by `find_file` or `new_file`.
    /// Removing a file that no longer exists is not an error.
    fn remove_file(&self, location: &Path) -> Result<(), StoreError>;

    /// Lists regular files directly inside the directory `path` across all
    /// locations, optionally filtered by a glob pattern on the file name.
    /// Returned names are relative store paths, sorted and deduplicated.
    fn list_file_names(&self, path: &str, filter: Option<&str>)
        -> Result<Vec<String>, StoreError>;

    /// The directory new files are written to.
    fn write_location(&self) -> &Path;
}

/// Writes `bytes` to `location` through a temporary sibling and a rename.
///
/// Callers writing the same location concurrently must hold the path's lock.
pub fn write_atomic(location: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = location.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = temp_path(location);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(StoreError::io(&tmp, e));
    }
    std::fs::rename(&tmp, location).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        StoreError::io(location, e)
    })
}

fn temp_path(location: &Path) -> PathBuf {
    let mut name = location
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    location.with_file_name(name)
}
