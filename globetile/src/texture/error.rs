//! Error types for texture encoding and transcoding.

use thiserror::Error;

/// Errors that can occur while decoding, validating or encoding tile
/// imagery.
///
/// Every variant is a local defect: the bytes reached us, but we could not
/// turn them into the cache's container format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextureError {
    /// The source bytes are not a decodable image.
    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    /// Image dimensions are invalid for encoding.
    #[error("Invalid dimensions {width}×{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    /// Encoding operation failed.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// No encoder exists for the requested container.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Bytes claim to be a container but are truncated or malformed.
    #[error("Invalid {format} data: {reason}")]
    InvalidContainer { format: String, reason: String },
}
