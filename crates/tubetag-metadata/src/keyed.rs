// SPDX-License-Identifier: GPL-3.0-or-later

//! Key rotation for song-search providers that hand out per-key quotas.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use tubetag_domain::{Candidate, SearchQuery};

use crate::MetadataSource;

/// One provider request made with one API key.
#[async_trait]
pub trait KeyedSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_with_key(
        &self,
        query: &SearchQuery,
        api_key: &str,
    ) -> Result<Vec<Candidate>, SongSearchError>;
}

#[derive(Debug, Error)]
pub enum SongSearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Tries each key in order until one yields a non-empty result.
///
/// A key that errors, times out, or comes back empty is not retried within the
/// same search.
pub struct KeyedSource<S> {
    inner: S,
    keys: Vec<String>,
    attempt_timeout: Duration,
}

impl<S: KeyedSearch> KeyedSource<S> {
    pub fn new(inner: S, keys: Vec<String>, attempt_timeout: Duration) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        Self {
            inner,
            keys,
            attempt_timeout,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    async fn attempt(
        &self,
        query: &SearchQuery,
        api_key: &str,
    ) -> Result<Vec<Candidate>, SongSearchError> {
        match timeout(self.attempt_timeout, self.inner.search_with_key(query, api_key)).await {
            Ok(result) => result,
            Err(_) => Err(SongSearchError::TimedOut(self.attempt_timeout)),
        }
    }
}

#[async_trait]
impl<S: KeyedSearch> MetadataSource for KeyedSource<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn search(&self, query: &SearchQuery) -> Option<Vec<Candidate>> {
        if self.keys.is_empty() {
            debug!(target: "pipeline", source = self.name(), "no API keys configured, skipping");
            return None;
        }

        for (index, key) in self.keys.iter().enumerate() {
            match self.attempt(query, key).await {
                Ok(candidates) if !candidates.is_empty() => {
                    debug!(
                        target: "pipeline",
                        source = self.name(),
                        key_index = index,
                        count = candidates.len(),
                        "song search answered"
                    );
                    return Some(candidates);
                }
                Ok(_) => {
                    debug!(target: "pipeline", source = self.name(), key_index = index, "empty result, trying next key");
                }
                Err(error) => {
                    warn!(target: "pipeline", source = self.name(), key_index = index, %error, "song search attempt failed, trying next key");
                }
            }
        }

        None
    }
}
