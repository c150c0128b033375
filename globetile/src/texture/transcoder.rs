//! Raw image to cache container conversion.

use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::config::LayerConfig;

use super::dds::{is_dds, validate_dds, DdsFormat, DdsTextureEncoder};
use super::encoder::{RasterEncoder, TextureEncoder};
use super::TextureError;

/// Converts downloaded images into the container a level caches.
///
/// Decoding goes through `image`; configured transparent colours are mapped
/// to alpha 0 before encoding.
///
/// # Example
///
/// ```
/// use globetile::texture::{DdsFormat, ImageTranscoder};
///
/// let transcoder = ImageTranscoder::new(DdsFormat::BC1)
///     .with_transparent_colors(vec![[0, 0, 0]]);
/// assert!(transcoder.supports("dds"));
/// assert!(!transcoder.supports("ktx2"));
/// ```
#[derive(Debug, Clone)]
pub struct ImageTranscoder {
    dds: DdsTextureEncoder,
    transparent_colors: Vec<[u8; 3]>,
}

impl ImageTranscoder {
    pub fn new(dds_format: DdsFormat) -> Self {
        Self {
            dds: DdsTextureEncoder::new(dds_format),
            transparent_colors: Vec::new(),
        }
    }

    /// Transcoder configured from a layer's options.
    pub fn from_layer_config(config: &LayerConfig) -> Self {
        Self::new(config.dds_compression)
            .with_transparent_colors(config.transparent_colors.clone())
    }

    pub fn with_transparent_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        self.transparent_colors = colors;
        self
    }

    /// Number of DDS mipmap levels to generate.
    pub fn with_mipmap_count(mut self, count: usize) -> Self {
        self.dds = self.dds.with_mipmap_count(count);
        self
    }

    /// True if `suffix` names a container this transcoder can produce.
    pub fn supports(&self, suffix: &str) -> bool {
        self.encoder_for(suffix).is_some()
    }

    fn encoder_for(&self, suffix: &str) -> Option<Box<dyn TextureEncoder>> {
        match suffix.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "dds" => Some(Box::new(self.dds.clone())),
            "png" => Some(Box::new(RasterEncoder::png())),
            "jpg" | "jpeg" => Some(Box::new(RasterEncoder::jpeg())),
            _ => None,
        }
    }

    /// Decodes `bytes` and re-encodes them as `target_suffix`.
    pub fn transcode(&self, bytes: &[u8], target_suffix: &str) -> Result<Vec<u8>, TextureError> {
        let encoder = self
            .encoder_for(target_suffix)
            .ok_or_else(|| TextureError::UnsupportedFormat(target_suffix.to_string()))?;

        let mut image = image::load_from_memory(bytes)
            .map_err(|e| TextureError::DecodeFailed(e.to_string()))?
            .to_rgba8();
        let cleared = self.apply_transparency(&mut image);

        let out = encoder.encode(&image)?;
        debug!(
            encoder = encoder.name(),
            width = image.width(),
            height = image.height(),
            transparent_pixels = cleared,
            bytes = out.len(),
            "Transcoded tile image"
        );
        Ok(out)
    }

    /// Sets alpha to 0 on pixels matching a transparent colour. Returns the
    /// number of pixels changed.
    fn apply_transparency(&self, image: &mut RgbaImage) -> usize {
        if self.transparent_colors.is_empty() {
            return 0;
        }
        let mut cleared = 0;
        for pixel in image.pixels_mut() {
            let rgb = [pixel[0], pixel[1], pixel[2]];
            if self.transparent_colors.contains(&rgb) {
                pixel[3] = 0;
                cleared += 1;
            }
        }
        cleared
    }
}

/// Image format named by a file suffix, if `image` knows it.
pub fn image_format_for_suffix(suffix: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(suffix.trim_start_matches('.'))
}

/// Checks that cached bytes are a usable file of the given container.
///
/// DDS files need a valid header and a complete top-level surface, image
/// formats must decode, zip archives need their signature. Unknown
/// containers only need to be non-empty.
pub fn validate_container(suffix: &str, bytes: &[u8]) -> Result<(), TextureError> {
    let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
    let invalid = |reason: &str| TextureError::InvalidContainer {
        format: suffix.clone(),
        reason: reason.to_string(),
    };
    if bytes.is_empty() {
        return Err(invalid("empty file"));
    }
    match suffix.as_str() {
        "dds" => validate_dds(bytes).map(|_| ()),
        "zip" => {
            if bytes.starts_with(b"PK") {
                Ok(())
            } else {
                Err(invalid("missing zip signature"))
            }
        }
        _ => match image_format_for_suffix(&suffix) {
            Some(format) => image::load_from_memory_with_format(bytes, format)
                .map(|_| ())
                .map_err(|e| invalid(&e.to_string())),
            None => Ok(()),
        },
    }
}

/// Guesses a content type from leading bytes, for responses that did not
/// declare one.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if is_dds(bytes) {
        return Some("image/dds");
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Some("application/zip");
    }
    if let Ok(format) = image::guess_format(bytes) {
        return Some(match format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::WebP => "image/webp",
            _ => "image/unknown",
        });
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<?xml") {
        Some("text/xml")
    } else if head.starts_with("<!doctype html") || head.starts_with("<html") {
        Some("text/html")
    } else {
        None
    }
}
