use crate::config::MAX_IMAGE_BYTES;
use reqwest::{Client, Url, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::debug;

/// Raw bytes of one successful download.
#[derive(Debug)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_length: Option<u64>,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid image url: {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid content type: {0}")]
    ContentType(String),
    #[error("image file too large: exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Downloads candidate images through a caller-supplied client.
///
/// Timeout and identifying headers live on the client. No retries happen here.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    http: Client,
    max_bytes: u64,
}

impl ImageFetcher {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError> {
        let parsed = Url::parse(url.trim()).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let mut response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|err| DownloadError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(DownloadError::ContentType(content_type));
        }

        let content_length = response.content_length();
        if content_length.is_some_and(|len| len > self.max_bytes) {
            return Err(DownloadError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(content_length.unwrap_or(8192).min(self.max_bytes) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| DownloadError::Transport(err.to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(
            target = "shelfshot.fetch",
            url = %url,
            content_type = %content_type,
            bytes = bytes.len(),
            "image_downloaded"
        );
        Ok(FetchedImage {
            bytes,
            content_type,
            content_length,
        })
    }
}
