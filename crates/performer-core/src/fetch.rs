//! HTTP image fetch.
//!
//! `HttpFetcher` is the operation an image loader runs behind the gate:
//! - GET the image URL with a configured client
//! - reject non-2xx responses and oversized or empty bodies
//! - identify the image format from its magic bytes
//!
//! Nothing is cached; every fetch goes to the network.

use crate::config::HttpConfig;
use crate::error::{PerformerError, Result};
use crate::loading::FetchOperation;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Instant;
use tracing::debug;
use url::Url;

/// Image container formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
}

impl ImageFormat {
    /// Identify the format of `data`, if it is one we know.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(ImageFormat::WebP)
            }
            [b'B', b'M', ..] => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Bmp => "bmp",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub url: Url,
    pub bytes: Bytes,
    /// `Content-Type` as sent by the server, if any.
    pub content_type: Option<String>,
    pub format: ImageFormat,
}

impl FetchedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fetches one image URL over HTTP.
pub struct HttpFetcher {
    client: Client,
    url: Url,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher with the default client settings.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(HttpConfig::REQUEST_TIMEOUT)
            .user_agent(HttpConfig::USER_AGENT)
            .build()
            .map_err(|e| PerformerError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;
        Ok(Self::with_client(client, url))
    }

    /// Create a fetcher sharing an existing client.
    pub fn with_client(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            max_bytes: HttpConfig::MAX_IMAGE_BYTES,
        }
    }

    /// Cap the accepted body size.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Download and identify the image.
    pub async fn fetch_image(&self) -> Result<FetchedImage> {
        let started = Instant::now();
        let url = self.url.as_str();

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| PerformerError::Network {
                message: format!("GET {} failed: {}", url, e),
                cause: std::error::Error::source(&e).map(|s| s.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PerformerError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        if bytes.is_empty() {
            return Err(PerformerError::Decode {
                url: url.to_string(),
                message: "empty response body".to_string(),
            });
        }

        let format = ImageFormat::sniff(&bytes).ok_or_else(|| PerformerError::Decode {
            url: url.to_string(),
            message: format!(
                "unrecognised image data (content type {})",
                content_type.as_deref().unwrap_or("unknown")
            ),
        })?;

        debug!(
            "Fetched {} ({} bytes, {}) in {:?}",
            url,
            bytes.len(),
            format,
            started.elapsed()
        );

        Ok(FetchedImage {
            url: self.url.clone(),
            bytes,
            content_type,
            format,
        })
    }

    fn too_large(&self) -> PerformerError {
        PerformerError::TooLarge {
            url: self.url.to_string(),
            limit: self.max_bytes,
        }
    }
}

#[async_trait]
impl FetchOperation<FetchedImage> for HttpFetcher {
    async fn fetch(&self) -> Result<FetchedImage> {
        self.fetch_image().await
    }
}
