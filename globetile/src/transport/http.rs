//! reqwest-backed transport with `file://` support.

use std::path::Path;

use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{
    BoxFuture, FetchResponse, Transport, TransportConfig, TransportError, SUPPORTED_PROTOCOLS,
};

/// Transport for `http`, `https` and `file` URLs.
///
/// - the connect timeout bounds connection setup
/// - the read timeout bounds the wait for each chunk of the body
/// - the stale-request limit bounds the whole request; a request still in
///   flight after it is abandoned with [`TransportError::Stale`]
///
/// Cancellation is checked while waiting on the network and wins over any
/// other outcome.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Builds a transport with the given timeouts.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn fetch_http(&self, url: Url) -> Result<FetchResponse, TransportError> {
        let mut response = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        loop {
            match tokio::time::timeout(self.config.read_timeout(), response.chunk()).await {
                Err(_) => {
                    return Err(TransportError::Timeout(format!(
                        "no data for {:?} after {} bytes",
                        self.config.read_timeout(),
                        body.len()
                    )))
                }
                Ok(Err(e)) => return Err(map_reqwest_error(e)),
                Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
                Ok(Ok(None)) => break,
            }
        }

        trace!(status, bytes = body.len(), "HTTP response received");
        Ok(FetchResponse::new(status, content_type.as_deref(), body.freeze()))
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchResponse, TransportError>> {
        Box::pin(async move {
            let parsed = Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
            let scheme = parsed.scheme().to_ascii_lowercase();
            if !SUPPORTED_PROTOCOLS.contains(&scheme.as_str()) {
                return Err(TransportError::UnsupportedProtocol(scheme));
            }
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            if scheme == "file" {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
                return tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                    result = fetch_file(&path) => result,
                };
            }

            let limit = self.config.stale_request_limit();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = tokio::time::timeout(limit, self.fetch_http(parsed)) => {
                    result.unwrap_or(Err(TransportError::Stale(limit)))
                }
            }
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

async fn fetch_file(path: &Path) -> Result<FetchResponse, TransportError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(FetchResponse::new(
            200,
            content_type_for_path(path),
            bytes,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(FetchResponse::new(404, None, Vec::new()))
        }
        Err(e) => Err(TransportError::Io(format!("{}: {}", path.display(), e))),
    }
}

/// Content type implied by a file extension.
fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "dds" => "image/dds",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "zip" => "application/zip",
        "xml" => "text/xml",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn transport() -> HttpTransport {
        HttpTransport::new(TransportConfig::default()).unwrap()
    }

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let result = transport()
            .fetch("ftp://example.com/tile.dds", &CancellationToken::new())
            .await;
        assert_eq!(
            result,
            Err(TransportError::UnsupportedProtocol("ftp".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = transport()
            .fetch("not a url", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_file_fetch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tile.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let response = transport()
            .fetch(&file_url(&path), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("image/png"));
        assert_eq!(&response.body[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let response = transport()
            .fetch(&file_url(&dir.path().join("missing.dds")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transport().fetch("http://127.0.0.1:9/tile", &cancel).await;
        assert_eq!(result, Err(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn test_stale_request_is_abandoned() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tile", listener.local_addr().unwrap());
        let transport = HttpTransport::new(
            TransportConfig::default().with_stale_request_limit(Duration::from_millis(150)),
        )
        .unwrap();

        let result = transport.fetch(&url, &CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(TransportError::Stale(Duration::from_millis(150)))
        );
        drop(listener);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_request() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tile", listener.local_addr().unwrap());
        let transport = transport();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = transport.fetch(&url, &cancel).await;
        assert_eq!(result, Err(TransportError::Cancelled));
        drop(listener);
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("a.DDS")), Some("image/dds"));
        assert_eq!(content_type_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(content_type_for_path(Path::new("a.bin")), None);
        assert_eq!(content_type_for_path(Path::new("noext")), None);
    }
}
