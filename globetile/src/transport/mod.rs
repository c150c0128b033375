//! Network transport abstraction.
//!
//! The retrieval pipeline fetches tile bytes through the [`Transport`] trait
//! so the HTTP stack can be swapped for a mock in tests. The trait is
//! dyn-compatible: methods return boxed futures and the pipeline holds an
//! `Arc<dyn Transport>`.
//!
//! Only the protocols in [`SUPPORTED_PROTOCOLS`] are understood. Anything
//! else fails with [`TransportError::UnsupportedProtocol`] before any I/O.
//!
//! A transport does not judge the response: non-success statuses come back
//! as a [`FetchResponse`] and are classified by the caller.

mod http;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{
    LayerConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_STALE_REQUEST_LIMIT_MS,
};

pub use http::HttpTransport;

/// Boxed future returned by dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// URL schemes the transport understands.
pub const SUPPORTED_PROTOCOLS: &[&str] = &["http", "https", "file"];

/// HTTP "no content" status.
pub const STATUS_NO_CONTENT: u16 = 204;

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The URL scheme is not in [`SUPPORTED_PROTOCOLS`].
    #[error("Unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    /// The URL could not be parsed.
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connect or read timeout elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The request stayed in flight longer than the stale-request limit.
    #[error("Request abandoned after {0:?}")]
    Stale(Duration),

    /// Any other request failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// A `file://` resource could not be read.
    #[error("File read failed: {0}")]
    Io(String),

    /// The fetch was cancelled by the caller.
    #[error("Cancelled")]
    Cancelled,
}

impl TransportError {
    /// True for the benign cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// True for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_)
                | TransportError::Timeout(_)
                | TransportError::Stale(_)
                | TransportError::Request(_)
        )
    }
}

/// Response of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Status code; `file://` fetches report 200 or 404.
    pub status: u16,
    /// Declared content type, without parameters, lowercased.
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(normalize_content_type),
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Strips parameters (`; charset=...`) and lowercases a content type.
pub fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Fetches raw bytes for a URL.
pub trait Transport: Send + Sync {
    /// Fetches `url`, abandoning the request when `cancel` fires.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchResponse, TransportError>>;
}

/// Timeouts applied by [`HttpTransport`].
///
/// # Example
///
/// ```
/// use globetile::transport::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::default().with_read_timeout(Duration::from_secs(2));
/// assert_eq!(config.connect_timeout(), Duration::from_millis(8_000));
/// assert_eq!(config.read_timeout(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    connect_timeout: Duration,
    read_timeout: Duration,
    stale_request_limit: Duration,
    user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            stale_request_limit: Duration::from_millis(DEFAULT_STALE_REQUEST_LIMIT_MS),
            user_agent: format!("globetile/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Timeouts taken from a layer configuration.
    pub fn from_layer_config(config: &LayerConfig) -> Self {
        Self::default()
            .with_connect_timeout(config.connect_timeout())
            .with_read_timeout(config.read_timeout())
            .with_stale_request_limit(config.stale_request_limit())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Maximum wait for each chunk of the response body.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Maximum total time a request may stay in flight.
    pub fn with_stale_request_limit(mut self, limit: Duration) -> Self {
        self.stale_request_limit = limit;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn stale_request_limit(&self) -> Duration {
        self.stale_request_limit
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
