//! Filesystem-backed [`FileStore`].

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::{FileStore, StoreError};

/// File store over one write directory and any number of read-only mirror
/// directories.
///
/// # Example
///
/// ```no_run
/// use globetile::store::{FileStore, LocalFileStore};
///
/// let store = LocalFileStore::new("/var/cache/globetile")
///     .with_read_location("/mnt/dvd/globetile");
///
/// if let Some(path) = store.find_file("Earth/BMNG/0/0/0_0_0.dds", true) {
///     println!("cached at {}", path.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    write_location: PathBuf,
    read_locations: Vec<PathBuf>,
}

impl LocalFileStore {
    /// Creates a store writing below `write_location`.
    pub fn new(write_location: impl Into<PathBuf>) -> Self {
        Self {
            write_location: write_location.into(),
            read_locations: Vec::new(),
        }
    }

    /// Adds a read-only location, searched after the write location and any
    /// read location added earlier.
    pub fn with_read_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.read_locations.push(location.into());
        self
    }

    /// Read-only locations in search order.
    pub fn read_locations(&self) -> &[PathBuf] {
        &self.read_locations
    }

    fn locations(&self, look_in_all: bool) -> impl Iterator<Item = &PathBuf> {
        let extra: &[PathBuf] = if look_in_all {
            self.read_locations.as_slice()
        } else {
            &[]
        };
        std::iter::once(&self.write_location).chain(extra.iter())
    }
}

/// Converts a relative `/`-separated store path into a `PathBuf`, rejecting
/// absolute paths and parent references.
fn relative(path: &str) -> Result<PathBuf, StoreError> {
    let candidate = Path::new(path.trim_start_matches("./"));
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(StoreError::InvalidPath(path.to_string())),
        }
    }
    Ok(out)
}

impl FileStore for LocalFileStore {
    fn find_file(&self, path: &str, look_in_all_locations: bool) -> Option<PathBuf> {
        let rel = relative(path).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        self.locations(look_in_all_locations)
            .map(|root| root.join(&rel))
            .find(|candidate| candidate.is_file())
    }

    fn new_file(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = relative(path)?;
        if rel.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let location = self.write_location.join(rel);
        if let Some(parent) = location.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        Ok(location)
    }

    fn remove_file(&self, location: &Path) -> Result<(), StoreError> {
        match std::fs::remove_file(location) {
            Ok(()) => {
                debug!(path = %location.display(), "Removed cache file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(location, e)),
        }
    }

    fn list_file_names(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let rel = relative(path)?;
        let pattern = filter.map(glob::Pattern::new).transpose()?;
        let prefix = path.trim_matches('/');
        let mut names = BTreeSet::new();

        for root in self.locations(true) {
            let dir = root.join(&rel);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&dir, e)),
            };
            for entry in entries.flatten() {
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if pattern.as_ref().is_some_and(|p| !p.matches(&name)) {
                    continue;
                }
                names.insert(if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                });
            }
        }

        Ok(names.into_iter().collect())
    }

    fn write_location(&self) -> &Path {
        &self.write_location
    }
}
