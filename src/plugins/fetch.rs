//! HTTP file fetching for download requirements.

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{Result, TarpError};

/// Fetches files over HTTP/HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

/// Body of a successful fetch.
#[derive(Debug)]
pub struct FetchResponse {
    pub content: Vec<u8>,
    /// Lowercase hex SHA-256 of `content`.
    pub sha256: String,
}

impl HttpFetcher {
    /// Create a fetcher with a 5-minute timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(300))
    }

    /// Create a fetcher with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch `url`, failing on any non-success status.
    pub fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let failed = |message: String| TarpError::DownloadFailed {
            url: url.to_string(),
            message,
        };

        let client = Client::builder()
            .user_agent(concat!("tarp/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| failed(e.to_string()))?;

        tracing::info!("Downloading {}", url);
        let response = client.get(url).send().map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let content = response
            .bytes()
            .map_err(|e| failed(e.to_string()))?
            .to_vec();
        let sha256 = hex::encode(Sha256::digest(&content));
        tracing::debug!("Downloaded {} bytes from {} (sha256 {})", content.len(), url, sha256);

        Ok(FetchResponse { content, sha256 })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}
