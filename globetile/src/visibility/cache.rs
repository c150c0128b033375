//! Frame-coherent bounding volume cache.
//!
//! Two generations are kept. Each traversal starts a new frame: the current
//! generation becomes the previous one and a new, empty current generation
//! is started. Lookups check the current generation, then the previous one,
//! promoting hits so volumes used every frame survive. Volumes not used for
//! a whole frame are dropped at the next swap. A change of globe state
//! discards both generations.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::geo::Sector;

use super::bounding::BoundingSphere;

#[derive(Debug, Default)]
struct Generations {
    state_key: Option<u64>,
    previous: HashMap<Sector, BoundingSphere>,
    current: HashMap<Sector, BoundingSphere>,
}

/// Bounding volumes keyed by sector, valid for one globe state.
///
/// Safe to share: a traversal reads and fills it while another thread may
/// [`invalidate`](Self::invalidate) it.
#[derive(Debug, Default)]
pub struct VolumeCache {
    inner: RwLock<Generations>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a frame for a globe in state `state_key`.
    ///
    /// An unchanged key rotates the generations; a new key empties the cache.
    pub fn begin_frame(&self, state_key: u64) {
        let mut inner = self.inner.write();
        if inner.state_key == Some(state_key) {
            inner.previous = std::mem::take(&mut inner.current);
        } else {
            inner.previous.clear();
            inner.current.clear();
            inner.state_key = Some(state_key);
        }
    }

    /// Cached volume for `sector`, promoting it from the previous frame.
    pub fn get(&self, sector: &Sector) -> Option<BoundingSphere> {
        let hit = self.inner.read().current.get(sector).copied();
        if hit.is_some() {
            return hit;
        }
        let mut inner = self.inner.write();
        let volume = inner.previous.remove(sector)?;
        inner.current.insert(*sector, volume);
        Some(volume)
    }

    /// Stores a volume computed for the current state.
    pub fn insert(&self, sector: Sector, volume: BoundingSphere) {
        self.inner.write().current.insert(sector, volume);
    }

    /// Forgets every volume and the globe state.
    pub fn invalidate(&self) {
        let mut inner = self.inner.write();
        inner.previous.clear();
        inner.current.clear();
        inner.state_key = None;
    }

    /// State the cached volumes belong to.
    pub fn state_key(&self) -> Option<u64> {
        self.inner.read().state_key
    }

    /// Volumes in both generations.
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.current.len() + inner.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
