// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

/// Downloads image bytes for embedding as the front cover.
#[async_trait]
pub trait CoverArtFetcher: Send + Sync {
    /// `None` when the image could not be fetched; callers fall back or skip the picture.
    async fn fetch_cover(&self, url: &str) -> Option<Arc<Vec<u8>>>;
}

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("Empty image body from {0}")]
    Empty(String),
}

pub struct ThumbnailClient {
    client: Client,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl ThumbnailClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|error| {
                debug!(?error, "Failed to build thumbnail HTTP client, falling back to default client");
                Client::new()
            });
        Self {
            client,
            // Album art is shared between tracks of one release; keep a handful around.
            cache: Cache::new(64),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Arc<Vec<u8>>, ThumbnailError> {
        if let Some(cached) = self.cache.get(url) {
            return Ok(cached);
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ThumbnailError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ThumbnailError::Empty(url.to_string()));
        }

        let bytes = Arc::new(bytes.to_vec());
        debug!(target: "tagging", url, size = bytes.len(), "Fetched cover image");
        self.cache.insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }
}

impl Default for ThumbnailClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CoverArtFetcher for ThumbnailClient {
    async fn fetch_cover(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        match self.fetch(url).await {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                warn!(target: "tagging", url, %error, "cover image fetch failed");
                None
            }
        }
    }
}
