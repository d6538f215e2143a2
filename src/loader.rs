//! Source image loading: locator -> raw bytes -> decoded pixels
//!
//! The network step sits behind the [`ImageFetcher`] trait so the pipeline
//! can be exercised in tests with canned bytes instead of a live server.
//! Failure here is surfaced to the orchestrator untouched; the loader never
//! retries on its own.

use crate::config::PipelineConfig;
use crate::error::{CutoutError, Result};
use crate::types::ImageLocator;
use async_trait::async_trait;
use futures_util::StreamExt;
use image::DynamicImage;
use reqwest::Client;
use std::sync::Arc;

/// Fetches the raw encoded bytes behind a locator
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Resolve the locator to its encoded payload
    ///
    /// # Errors
    /// - `CutoutError::Fetch` for network failures, non-success status
    ///   codes, or oversized payloads
    async fn fetch(&self, locator: &ImageLocator) -> Result<Vec<u8>>;
}

/// HTTP fetcher backed by a shared `reqwest` client
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher honoring the pipeline's timeout and size limits
    ///
    /// # Errors
    /// - `CutoutError::Fetch` if the HTTP client cannot be constructed
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| CutoutError::fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_source_bytes,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, locator: &ImageLocator) -> Result<Vec<u8>> {
        log::debug!("Fetching source image: {}", locator);

        let response = self
            .client
            .get(locator.as_str())
            .send()
            .await
            .map_err(|e| CutoutError::fetch_locator(locator.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CutoutError::fetch_locator(
                locator.as_str(),
                format!("HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(CutoutError::fetch_locator(
                    locator.as_str(),
                    format!("payload of {len} bytes exceeds limit of {}", self.max_bytes),
                ));
            }
        }

        // Stream the body so a server that omits Content-Length (chunked
        // transfer) still cannot push us past the size limit before we
        // notice: the fetch aborts as soon as the running total exceeds it
        let mut stream = response.bytes_stream();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CutoutError::fetch_locator(locator.as_str(), e))?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(CutoutError::fetch_locator(
                    locator.as_str(),
                    format!(
                        "payload exceeds limit of {} bytes after {} received",
                        self.max_bytes,
                        bytes.len()
                    ),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        log::debug!("Fetched {} bytes from {}", bytes.len(), locator);
        Ok(bytes)
    }
}

/// Source Loader: turns a locator into a decoded, pixel-addressable image
pub struct Loader {
    fetcher: Arc<dyn ImageFetcher>,
}

impl Loader {
    /// Create a loader over the given fetcher
    #[must_use]
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and decode the image behind a locator
    ///
    /// The encoded bytes are dropped as soon as decoding completes; only the
    /// pixel buffer survives this call.
    ///
    /// # Errors
    /// - `CutoutError::Fetch` from the fetcher
    /// - `CutoutError::Decode` for corrupt or unsupported payloads
    pub async fn load(&self, locator: &ImageLocator) -> Result<DynamicImage> {
        let bytes = self.fetcher.fetch(locator).await?;
        Self::decode(&bytes, locator)
    }

    /// Decode encoded bytes with content-based format detection
    fn decode(bytes: &[u8], locator: &ImageLocator) -> Result<DynamicImage> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            CutoutError::decode(format!(
                "failed to decode {} bytes from '{}': {e}",
                bytes.len(),
                locator
            ))
        })?;
        log::debug!(
            "Decoded {} to {}x{} pixels",
            locator,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    struct StaticFetcher(Vec<u8>);

    #[async_trait]
    impl ImageFetcher for StaticFetcher {
        async fn fetch(&self, _locator: &ImageLocator) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ImageFetcher for FailingFetcher {
        async fn fetch(&self, locator: &ImageLocator) -> Result<Vec<u8>> {
            Err(CutoutError::fetch_locator(locator.as_str(), "HTTP 404"))
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_load_decodes_valid_png() {
        let loader = Loader::new(Arc::new(StaticFetcher(png_bytes(8, 6))));
        let image = loader
            .load(&ImageLocator::new("https://example.com/a.png"))
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
    }

    #[tokio::test]
    async fn test_load_surfaces_fetch_errors() {
        let loader = Loader::new(Arc::new(FailingFetcher));
        let err = loader
            .load(&ImageLocator::new("https://example.com/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_bytes() {
        let loader = Loader::new(Arc::new(StaticFetcher(vec![0xDE, 0xAD, 0xBE, 0xEF])));
        let err = loader
            .load(&ImageLocator::new("https://example.com/bad.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::Decode(_)));
    }

    #[test]
    fn test_http_fetcher_construction() {
        let config = PipelineConfig::default();
        assert!(HttpFetcher::new(&config).is_ok());
    }

    /// Serve one HTTP response, then close the connection
    async fn serve_once(response_head: String, body_chunks: Vec<Vec<u8>>) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response_head.as_bytes()).await;
            for chunk in body_chunks {
                // The client may hang up mid-body once its limit trips
                if socket.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_http_fetcher_small_payload_round_trips() {
        let body = b"not really an image, but bytes".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let addr = serve_once(head, vec![body.clone()]).await;

        let fetcher = HttpFetcher::new(&PipelineConfig::default()).unwrap();
        let bytes = fetcher
            .fetch(&ImageLocator::new(format!("http://{addr}/img.bin")))
            .await
            .unwrap();
        assert_eq!(bytes, body);
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_oversized_declared_payload() {
        let head =
            "HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n".to_string();
        let addr = serve_once(head, vec![vec![0u8; 4096]]).await;

        let config = PipelineConfig::builder()
            .max_source_bytes(1024)
            .build()
            .unwrap();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher
            .fetch(&ImageLocator::new(format!("http://{addr}/big.bin")))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_http_fetcher_cuts_off_unsized_payload_at_limit() {
        // No Content-Length header: the limit must hold mid-stream instead
        // of after the whole body has been buffered
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string();
        let addr = serve_once(head, vec![vec![0u8; 1024]; 16]).await;

        let config = PipelineConfig::builder()
            .max_source_bytes(4096)
            .build()
            .unwrap();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher
            .fetch(&ImageLocator::new(format!("http://{addr}/endless.bin")))
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::Fetch(_)));
        assert!(err.to_string().contains("exceeds limit"));
    }
}
