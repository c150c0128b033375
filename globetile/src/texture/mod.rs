//! Tile image encoding.
//!
//! Tiles arrive either already in the cache's container format (persisted
//! verbatim) or as raw images that must be converted. Conversion goes
//! through the [`TextureEncoder`] trait so containers can be added without
//! touching the retrieval pipeline.
//!
//! ```text
//!   raw image bytes
//!         │
//!         ▼
//! ┌─────────────────┐   decode (image), transparent colours → alpha 0
//! │ ImageTranscoder │
//! └────────┬────────┘
//!          │ Box<dyn TextureEncoder>
//!     ┌────┴─────────────┐
//!     ▼                  ▼
//! ┌──────────────┐ ┌──────────────┐
//! │ DdsTexture   │ │ Raster       │
//! │ Encoder      │ │ Encoder      │
//! │ (BC1 / BC3)  │ │ (PNG / JPEG) │
//! └──────────────┘ └──────────────┘
//! ```

mod dds;
mod encoder;
mod error;
mod transcoder;

pub use dds::{
    is_dds, validate_dds, DdsFormat, DdsHeader, DdsTextureEncoder, DDS_HEADER_SIZE, DDS_MAGIC,
};
pub use encoder::{RasterEncoder, TextureEncoder};
pub use error::TextureError;
pub use transcoder::{
    image_format_for_suffix, sniff_content_type, validate_container, ImageTranscoder,
};
