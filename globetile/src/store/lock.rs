//! Path-scoped mutual exclusion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per cache path.
///
/// Workers hold the guard across "check exists, read, write" for a single
/// file so reads and writes of that file never interleave. Unrelated paths
/// never contend. A path's entry lives only while someone holds or waits
/// for its lock.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> PathGuard<'_> {
        let path = path.to_path_buf();
        let mutex = self
            .locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        PathGuard {
            guard: Some(guard),
            locks: self,
            path,
        }
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one path. Dropping it releases the lock and forgets
/// the path once nobody else holds or waits for it.
#[derive(Debug)]
pub struct PathGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a PathLocks,
    path: PathBuf,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only reference to an idle lock.
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.path, |_, m| Arc::strong_count(m) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                tokio::spawn(async move {
                    let _guard = locks.lock(Path::new("tile.dds")).await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock(Path::new("a.dds")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Path::new("b.dds")))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_lock_is_forgotten() {
        let locks = PathLocks::new();
        let held = locks.lock(Path::new("held")).await;
        drop(locks.lock(Path::new("released")).await);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_pending() {
        let locks = Arc::new(PathLocks::new());
        let first = locks.lock(Path::new("tile.dds")).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(Path::new("tile.dds")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still needs the same mutex.
        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
