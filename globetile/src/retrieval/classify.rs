//! Response classification.
//!
//! Decides what to do with the bytes a transport returned, from the status
//! and declared content type:
//!
//! | Response                                   | Action                     |
//! |--------------------------------------------|----------------------------|
//! | 204, empty body, non-2xx status            | absent                     |
//! | text/*, xml, html                          | absent (error payload)     |
//! | DDS, zip, image matching the cache format  | store verbatim             |
//! | any other image                            | transcode, then store      |
//! | unknown type                               | absent                     |
//!
//! Responses without a content type, or declared as
//! `application/octet-stream`, are sniffed from their leading bytes.

use std::fmt;

use bytes::Bytes;
use image::ImageFormat;

use crate::texture::{image_format_for_suffix, sniff_content_type};
use crate::transport::{
    normalize_content_type, FetchResponse, TransportError, STATUS_NO_CONTENT,
};

/// Maximum number of payload bytes kept for logging an error response.
pub const MAX_PAYLOAD_EXCERPT: usize = 2_048;

const OCTET_STREAM: &str = "application/octet-stream";

/// Why a resource was judged unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    /// "No content" status or an empty body.
    NoContent,
    /// Non-success HTTP status.
    HttpStatus(u16),
    /// The server answered with text where imagery was expected.
    ErrorPayload {
        content_type: String,
        excerpt: String,
    },
    /// A content type the pipeline cannot store.
    UnknownContent(String),
    /// The transport failed.
    Transport(TransportError),
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::NoContent => write!(f, "no content"),
            AbsentReason::HttpStatus(status) => write!(f, "HTTP status {}", status),
            AbsentReason::ErrorPayload { content_type, .. } => {
                write!(f, "error payload ({})", content_type)
            }
            AbsentReason::UnknownContent(content_type) => {
                write!(f, "unexpected content type '{}'", content_type)
            }
            AbsentReason::Transport(err) => write!(f, "{}", err),
        }
    }
}

/// What to do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Mark the tile absent and discard the body.
    Absent(AbsentReason),
    /// Persist the body as-is.
    Store(Bytes),
    /// Decode the body and re-encode it in the cache format.
    Transcode(Bytes),
}

/// Classifies a response for a level caching `format_suffix` files.
pub fn classify(response: FetchResponse, format_suffix: &str) -> Classification {
    if response.status == STATUS_NO_CONTENT || (response.is_success() && response.body.is_empty())
    {
        return Classification::Absent(AbsentReason::NoContent);
    }
    if !response.is_success() {
        return Classification::Absent(AbsentReason::HttpStatus(response.status));
    }

    let normalized = response.content_type.as_deref().map(normalize_content_type);
    let declared = normalized
        .clone()
        .filter(|t| !t.is_empty() && t != OCTET_STREAM);
    let content_type = match declared {
        Some(content_type) => content_type,
        None => match sniff_content_type(&response.body) {
            Some(sniffed) => sniffed.to_string(),
            // Opaque binary with no recognisable signature.
            None if normalized.as_deref() == Some(OCTET_STREAM) => {
                return Classification::Store(response.body)
            }
            None => {
                return Classification::Absent(AbsentReason::UnknownContent(
                    normalized.unwrap_or_default(),
                ))
            }
        },
    };

    classify_content(&content_type, response.body, format_suffix)
}

fn classify_content(content_type: &str, body: Bytes, format_suffix: &str) -> Classification {
    if is_textual(content_type) {
        return Classification::Absent(AbsentReason::ErrorPayload {
            content_type: content_type.to_string(),
            excerpt: excerpt(&body),
        });
    }
    if is_precompressed(content_type) {
        return Classification::Store(body);
    }
    if content_type.starts_with("image/") {
        let declared = ImageFormat::from_mime_type(content_type);
        let expected = image_format_for_suffix(format_suffix);
        return match (declared, expected) {
            (Some(declared), Some(expected)) if declared == expected => {
                Classification::Store(body)
            }
            _ => Classification::Transcode(body),
        };
    }
    Classification::Absent(AbsentReason::UnknownContent(content_type.to_string()))
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("xml") || content_type.contains("html")
}

fn is_precompressed(content_type: &str) -> bool {
    content_type.contains("zip") || content_type.ends_with("dds")
}

/// Leading bytes of an error payload as text.
fn excerpt(body: &[u8]) -> String {
    let end = body.len().min(MAX_PAYLOAD_EXCERPT);
    String::from_utf8_lossy(&body[..end]).trim().to_string()
}
