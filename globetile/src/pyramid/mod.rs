//! Tile pyramid model.
//!
//! A dataset is partitioned into a pyramid of fixed-size tiles. Level 0 is
//! the coarsest; each level halves the angular size of its tiles.
//!
//! ```text
//!   level 0   ┌───────────────┐   tile delta = d
//!             │               │
//!             └───────────────┘
//!   level 1   ┌───────┬───────┐   tile delta = d / 2
//!             │       │       │
//!             ├───────┼───────┤
//!             │       │       │
//!             └───────┴───────┘
//!   level n                       tile delta = d / 2^n
//! ```
//!
//! Rows and columns are counted from the tile origin (by default the
//! south-west corner of the globe), so a tile's sector is computed in
//! constant time from its key.

mod level;
mod level_set;
mod tile;

pub use level::Level;
pub use level_set::LevelSet;
pub use tile::{Tile, TileKey};
