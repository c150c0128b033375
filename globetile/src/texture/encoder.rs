//! TextureEncoder trait and the raster encoders built on `image`.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};

use super::TextureError;

/// Strategy for encoding an RGBA image into a cache container format.
///
/// Implementations must be thread-safe (`Send + Sync`) so a single encoder
/// can be shared by every retrieval worker.
pub trait TextureEncoder: Send + Sync {
    /// Encodes the image into a complete file (headers included).
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, TextureError>;

    /// File extension of the produced container, without the dot.
    fn extension(&self) -> &str;

    /// Human-readable encoder name for logs.
    fn name(&self) -> &str;
}

/// Encodes PNG or JPEG through the `image` crate.
///
/// JPEG has no alpha channel, so transparency is dropped when encoding JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterEncoder {
    format: ImageFormat,
}

impl RasterEncoder {
    pub fn png() -> Self {
        Self {
            format: ImageFormat::Png,
        }
    }

    pub fn jpeg() -> Self {
        Self {
            format: ImageFormat::Jpeg,
        }
    }
}

impl TextureEncoder for RasterEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, TextureError> {
        let dynamic = match self.format {
            ImageFormat::Jpeg => {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8())
            }
            _ => DynamicImage::ImageRgba8(image.clone()),
        };
        let mut out = Cursor::new(Vec::new());
        dynamic
            .write_to(&mut out, self.format)
            .map_err(|e| TextureError::EncodingFailed(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn extension(&self) -> &str {
        match self.format {
            ImageFormat::Jpeg => "jpg",
            _ => "png",
        }
    }

    fn name(&self) -> &str {
        match self.format {
            ImageFormat::Jpeg => "JPEG",
            _ => "PNG",
        }
    }
}
