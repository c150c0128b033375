//! Tile addressing types.
//!
//! A [`TileKey`] names one `(level, row, column)` cell of a pyramid and is the
//! identity used for queue deduplication and absent-resource tracking. A
//! [`Tile`] pairs the key with its derived sector, a retrieval priority, and
//! the payload once loaded.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::geo::Sector;

/// Address of one tile in a pyramid.
///
/// Rows increase northward from the tile origin, columns increase eastward.
///
/// # Example
///
/// ```
/// use globetile::pyramid::TileKey;
///
/// let key = TileKey::new(2, 10, 21);
/// assert_eq!(key.level(), 2);
/// assert_eq!(key.to_string(), "2/10/21");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u32,
    row: u32,
    col: u32,
}

impl TileKey {
    /// Creates a new tile key.
    pub const fn new(level: u32, row: u32, col: u32) -> Self {
        Self { level, row, col }
    }

    /// Pyramid level (0 = coarsest).
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Tile row.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Tile column.
    pub fn col(&self) -> u32 {
        self.col
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// One tile of a pyramid.
///
/// Two tiles are equal when their keys are equal; priority and payload do
/// not take part in equality or hashing.
#[derive(Debug, Clone)]
pub struct Tile {
    key: TileKey,
    sector: Sector,
    priority: f64,
    payload: Option<Bytes>,
}

impl Tile {
    /// Creates a tile with no payload and the lowest urgency.
    pub fn new(key: TileKey, sector: Sector) -> Self {
        Self {
            key,
            sector,
            priority: f64::MAX,
            payload: None,
        }
    }

    /// The tile address.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Pyramid level.
    pub fn level(&self) -> u32 {
        self.key.level
    }

    /// Tile row.
    pub fn row(&self) -> u32 {
        self.key.row
    }

    /// Tile column.
    pub fn col(&self) -> u32 {
        self.key.col
    }

    /// Geographic coverage of the tile.
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Retrieval priority; lower values are more urgent.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Sets the retrieval priority.
    pub fn set_priority(&mut self, priority: f64) {
        self.priority = priority;
    }

    /// Builder-style priority setter.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// The loaded bytes, if any.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Attaches loaded bytes to the tile.
    pub fn set_payload(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }

    /// Removes and returns the payload.
    pub fn take_payload(&mut self) -> Option<Bytes> {
        self.payload.take()
    }
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tile {}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {}", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sector() -> Sector {
        Sector::from_degrees(0.0, 9.0, 0.0, 9.0)
    }

    #[test]
    fn test_key_accessors() {
        let key = TileKey::new(3, 7, 11);
        assert_eq!(key.level(), 3);
        assert_eq!(key.row(), 7);
        assert_eq!(key.col(), 11);
    }

    #[test]
    fn test_key_ordering_is_level_row_col() {
        let mut keys = vec![
            TileKey::new(1, 0, 0),
            TileKey::new(0, 5, 5),
            TileKey::new(1, 0, 1),
        ];
        keys.sort();
        assert_eq!(keys[0], TileKey::new(0, 5, 5));
        assert_eq!(keys[2], TileKey::new(1, 0, 1));
    }

    #[test]
    fn test_tile_equality_ignores_priority_and_payload() {
        let a = Tile::new(TileKey::new(2, 1, 1), sector()).with_priority(1.0);
        let mut b = Tile::new(TileKey::new(2, 1, 1), sector()).with_priority(99.0);
        b.set_payload(Bytes::from_static(b"data"));

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_payload_lifecycle() {
        let mut tile = Tile::new(TileKey::new(0, 0, 0), sector());
        assert!(tile.payload().is_none());

        tile.set_payload(Bytes::from_static(b"abc"));
        assert_eq!(tile.payload().map(|b| b.len()), Some(3));

        let taken = tile.take_payload();
        assert_eq!(taken, Some(Bytes::from_static(b"abc")));
        assert!(tile.payload().is_none());
    }
}
