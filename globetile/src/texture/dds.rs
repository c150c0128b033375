//! DirectDraw Surface (DDS) container with BC1/BC3 block compression.
//!
//! ```text
//! ┌──────────┬──────────────────────┬────────────┬────────────┬───┐
//! │ "DDS "   │ header (124 bytes)   │ level 0    │ level 1    │...│
//! │ 4 bytes  │ size, flags, w, h,   │ 4×4 blocks │ 4×4 blocks │   │
//! │          │ pixel format (DXTn)  │            │            │   │
//! └──────────┴──────────────────────┴────────────┴────────────┴───┘
//! ```
//!
//! BC1 (DXT1) stores 8 bytes per 4×4 block, BC3 (DXT5) 16 bytes. Block
//! compression is delegated to `intel_tex_2`.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use intel_tex_2::{bc1, bc3, RgbaSurface};
use serde::{Deserialize, Serialize};

use super::{TextureEncoder, TextureError};

/// Container magic.
pub const DDS_MAGIC: &[u8; 4] = b"DDS ";

/// Magic plus header.
pub const DDS_HEADER_SIZE: usize = 128;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_MIPMAPCOUNT: u32 = 0x20000;
const DDSD_LINEARSIZE: u32 = 0x80000;
const DDPF_FOURCC: u32 = 0x4;
const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_MIPMAP: u32 = 0x400000;

/// Block compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DdsFormat {
    /// DXT1: opaque or 1-bit alpha.
    BC1,
    /// DXT5: interpolated alpha.
    BC3,
}

impl DdsFormat {
    /// Bytes per 4×4 block.
    pub fn block_size(&self) -> usize {
        match self {
            DdsFormat::BC1 => 8,
            DdsFormat::BC3 => 16,
        }
    }

    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            DdsFormat::BC1 => *b"DXT1",
            DdsFormat::BC3 => *b"DXT5",
        }
    }

    fn from_fourcc(fourcc: &[u8]) -> Option<Self> {
        match fourcc {
            b"DXT1" => Some(DdsFormat::BC1),
            b"DXT5" => Some(DdsFormat::BC3),
            _ => None,
        }
    }

    /// Size of one compressed surface.
    pub fn surface_size(&self, width: u32, height: u32) -> usize {
        width.div_ceil(4) as usize * height.div_ceil(4) as usize * self.block_size()
    }
}

/// The fields of a DDS header this crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsHeader {
    pub width: u32,
    pub height: u32,
    pub mipmap_count: u32,
    /// `None` for pixel formats other than DXT1/DXT5.
    pub format: Option<DdsFormat>,
}

impl DdsHeader {
    pub fn new(width: u32, height: u32, mipmap_count: u32, format: DdsFormat) -> Self {
        Self {
            width,
            height,
            mipmap_count,
            format: Some(format),
        }
    }

    /// Serialises magic and header (128 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        let format = self.format.unwrap_or(DdsFormat::BC1);
        let mut flags = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT | DDSD_LINEARSIZE;
        let mut caps = DDSCAPS_TEXTURE;
        if self.mipmap_count > 1 {
            flags |= DDSD_MIPMAPCOUNT;
            caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
        }

        let mut bytes = Vec::with_capacity(DDS_HEADER_SIZE);
        bytes.extend_from_slice(DDS_MAGIC);
        for value in [
            124,
            flags,
            self.height,
            self.width,
            format.surface_size(self.width, self.height) as u32,
            0,
            self.mipmap_count,
        ] {
            bytes.extend_from_slice(&u32::to_le_bytes(value));
        }
        bytes.extend_from_slice(&[0u8; 44]);

        // Pixel format.
        bytes.extend_from_slice(&32u32.to_le_bytes());
        bytes.extend_from_slice(&DDPF_FOURCC.to_le_bytes());
        bytes.extend_from_slice(&format.fourcc());
        bytes.extend_from_slice(&[0u8; 20]);

        bytes.extend_from_slice(&caps.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    /// Parses and sanity-checks the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, TextureError> {
        let invalid = |reason: &str| TextureError::InvalidContainer {
            format: "dds".to_string(),
            reason: reason.to_string(),
        };
        if bytes.len() < DDS_HEADER_SIZE {
            return Err(invalid("shorter than header"));
        }
        if &bytes[..4] != DDS_MAGIC {
            return Err(invalid("missing magic"));
        }
        let read = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        if read(4) != 124 || read(76) != 32 {
            return Err(invalid("bad header size"));
        }
        let height = read(12);
        let width = read(16);
        if width == 0 || height == 0 {
            return Err(invalid("zero dimensions"));
        }
        let format = if read(80) & DDPF_FOURCC != 0 {
            DdsFormat::from_fourcc(&bytes[84..88])
        } else {
            None
        };
        Ok(Self {
            width,
            height,
            mipmap_count: read(28).max(1),
            format,
        })
    }
}

/// Returns true if `bytes` start with the DDS magic.
pub fn is_dds(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == DDS_MAGIC
}

/// Checks that `bytes` hold a complete DDS file.
///
/// For DXT1/DXT5 the top-level surface must be fully present; other pixel
/// formats are accepted on a valid header alone.
pub fn validate_dds(bytes: &[u8]) -> Result<DdsHeader, TextureError> {
    let header = DdsHeader::parse(bytes)?;
    if let Some(format) = header.format {
        let needed = DDS_HEADER_SIZE + format.surface_size(header.width, header.height);
        if bytes.len() < needed {
            return Err(TextureError::InvalidContainer {
                format: "dds".to_string(),
                reason: format!("truncated: {} of {} bytes", bytes.len(), needed),
            });
        }
    }
    Ok(header)
}

/// DDS texture encoder.
///
/// # Example
///
/// ```
/// use globetile::texture::{DdsFormat, DdsTextureEncoder, TextureEncoder};
///
/// let encoder = DdsTextureEncoder::new(DdsFormat::BC1).with_mipmap_count(3);
/// assert_eq!(encoder.extension(), "dds");
/// assert_eq!(encoder.name(), "DDS BC1");
/// ```
#[derive(Debug, Clone)]
pub struct DdsTextureEncoder {
    format: DdsFormat,
    mipmap_count: usize,
}

impl DdsTextureEncoder {
    /// Creates an encoder producing a single surface without mipmaps.
    pub fn new(format: DdsFormat) -> Self {
        Self {
            format,
            mipmap_count: 1,
        }
    }

    /// Number of levels including the base level. Generation stops early
    /// once a level reaches 1×1.
    pub fn with_mipmap_count(mut self, count: usize) -> Self {
        self.mipmap_count = count.max(1);
        self
    }

    pub fn format(&self) -> DdsFormat {
        self.format
    }

    pub fn mipmap_count(&self) -> usize {
        self.mipmap_count
    }

    /// Expected file size for a base image of the given size.
    pub fn expected_size(&self, width: u32, height: u32) -> usize {
        let (mut w, mut h) = (width, height);
        let mut total = DDS_HEADER_SIZE;
        for _ in 0..self.levels(width, height) {
            total += self.format.surface_size(w, h);
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total
    }

    fn levels(&self, width: u32, height: u32) -> usize {
        let full_chain = 32 - width.max(height).max(1).leading_zeros() as usize;
        self.mipmap_count.min(full_chain)
    }

    fn compress(&self, image: &RgbaImage) -> Vec<u8> {
        let (width, height) = image.dimensions();
        let padded_w = width.div_ceil(4) * 4;
        let padded_h = height.div_ceil(4) * 4;

        // The block compressor works on whole blocks; edge pixels are
        // replicated into the padding.
        let data = if padded_w == width && padded_h == height {
            image.as_raw().clone()
        } else {
            let mut padded = Vec::with_capacity((padded_w * padded_h * 4) as usize);
            for y in 0..padded_h {
                for x in 0..padded_w {
                    let pixel = image.get_pixel(x.min(width - 1), y.min(height - 1));
                    padded.extend_from_slice(&pixel.0);
                }
            }
            padded
        };

        let surface = RgbaSurface {
            data: &data,
            width: padded_w,
            height: padded_h,
            stride: padded_w * 4,
        };
        match self.format {
            DdsFormat::BC1 => bc1::compress_blocks(&surface),
            DdsFormat::BC3 => bc3::compress_blocks(&surface),
        }
    }
}

impl TextureEncoder for DdsTextureEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, TextureError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions {
                width,
                height,
                reason: "must be non-zero".to_string(),
            });
        }

        let levels = self.levels(width, height);
        let mut out = Vec::with_capacity(self.expected_size(width, height));
        let header = DdsHeader::new(width, height, levels as u32, self.format);
        out.extend_from_slice(&header.to_bytes());

        let mut current = image.clone();
        for level in 0..levels {
            if level > 0 {
                let (w, h) = current.dimensions();
                current = imageops::resize(
                    &current,
                    (w / 2).max(1),
                    (h / 2).max(1),
                    FilterType::Triangle,
                );
            }
            out.extend_from_slice(&self.compress(&current));
        }
        Ok(out)
    }

    fn extension(&self) -> &str {
        "dds"
    }

    fn name(&self) -> &str {
        match self.format {
            DdsFormat::BC1 => "DDS BC1",
            DdsFormat::BC3 => "DDS BC3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_header_layout() {
        let bytes = DdsHeader::new(256, 128, 1, DdsFormat::BC1).to_bytes();
        assert_eq!(bytes.len(), DDS_HEADER_SIZE);
        assert_eq!(&bytes[..4], b"DDS ");
        assert_eq!(&bytes[84..88], b"DXT1");

        let parsed = DdsHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, DdsHeader::new(256, 128, 1, DdsFormat::BC1));
    }

    #[test]
    fn test_header_mipmap_flags() {
        let bytes = DdsHeader::new(64, 64, 7, DdsFormat::BC3).to_bytes();
        let flags = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_ne!(flags & DDSD_MIPMAPCOUNT, 0);
        assert_eq!(&bytes[84..88], b"DXT5");
    }

    #[test]
    fn test_encode_bc1_size() {
        let image = RgbaImage::from_pixel(16, 16, Rgba([200, 100, 50, 255]));
        let encoder = DdsTextureEncoder::new(DdsFormat::BC1);
        let bytes = encoder.encode(&image).unwrap();

        // 4×4 blocks of 8 bytes.
        assert_eq!(bytes.len(), DDS_HEADER_SIZE + 16 * 8);
        assert_eq!(bytes.len(), encoder.expected_size(16, 16));
        assert!(validate_dds(&bytes).is_ok());
    }

    #[test]
    fn test_encode_bc3_with_mipmaps() {
        let image = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 128]));
        let encoder = DdsTextureEncoder::new(DdsFormat::BC3).with_mipmap_count(10);
        let bytes = encoder.encode(&image).unwrap();

        // 16, 8, 4, 2, 1: five levels.
        assert_eq!(DdsHeader::parse(&bytes).unwrap().mipmap_count, 5);
        assert_eq!(bytes.len(), encoder.expected_size(16, 16));
    }

    #[test]
    fn test_encode_pads_odd_sizes() {
        let image = RgbaImage::from_pixel(10, 6, Rgba([1, 2, 3, 255]));
        let bytes = DdsTextureEncoder::new(DdsFormat::BC1).encode(&image).unwrap();
        // 3×2 blocks.
        assert_eq!(bytes.len(), DDS_HEADER_SIZE + 6 * 8);
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let image = RgbaImage::new(0, 0);
        assert!(matches!(
            DdsTextureEncoder::new(DdsFormat::BC1).encode(&image),
            Err(TextureError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_truncated() {
        let mut bytes = DdsHeader::new(16, 16, 1, DdsFormat::BC1).to_bytes();
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            validate_dds(&bytes),
            Err(TextureError::InvalidContainer { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate_dds(b"<html>error</html>").is_err());
        assert!(!is_dds(b"PNG"));
        assert!(is_dds(b"DDS \0\0"));
    }

    #[test]
    fn test_format_serde_names() {
        assert_eq!(serde_json::to_string(&DdsFormat::BC3).unwrap(), "\"bc3\"");
        let parsed: DdsFormat = serde_json::from_str("\"bc1\"").unwrap();
        assert_eq!(parsed, DdsFormat::BC1);
    }
}
