// SPDX-License-Identifier: GPL-3.0-or-later

//! Discogs database search client (the structured release source).

use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::header::HeaderMap;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{self, Value};
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};
use tubetag_domain::{AlbumCandidate, Candidate, ReleaseCandidate, SearchQuery};

use crate::quota::QuotaThrottle;
use crate::MetadataSource;

const DISCOGS_API_BASE: &str = "https://api.discogs.com";
const RATELIMIT_REMAINING_HEADER: &str = "x-discogs-ratelimit-remaining";

/// Struct representing the Discogs API client.
///
/// One instance is meant to be shared by every concurrent tagging job so they all
/// draw on the same quota counter.
pub struct DiscogsClient {
    token: Option<String>,
    client: Client,
    throttle: QuotaThrottle,
    cache: Cache<String, Vec<Candidate>>,
    /// Base URL stored without a trailing slash.
    base_url: String,
}

impl DiscogsClient {
    /// Creates a new Discogs API client with the default quota policy.
    pub fn new(token: Option<String>, base_url: Option<String>) -> Self {
        let client = Self::new_with_quota(
            token,
            QuotaThrottle::discogs_default(),
            Duration::from_secs(30),
            base_url,
        );
        debug!(target: "discogs", base_url = %client.base_url, "Initialized Discogs client");
        client
    }

    /// Creates a new Discogs API client with an explicit quota throttle and request timeout.
    pub fn new_with_quota(
        token: Option<String>,
        throttle: QuotaThrottle,
        timeout: Duration,
        base_url: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(concat!(
                "tubetag/",
                env!("CARGO_PKG_VERSION"),
                " (+https://github.com/tubetag/tubetag)"
            ))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|error| {
                debug!(
                    ?error,
                    "Failed to build Discogs HTTP client with custom user agent, falling back to default client"
                );
                Client::new()
            });

        Self {
            token,
            client,
            throttle,
            cache: Cache::new(10_000),
            // Trim trailing slash once at construction so every URL format is clean.
            base_url: base_url
                .unwrap_or_else(|| DISCOGS_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn throttle(&self) -> &QuotaThrottle {
        &self.throttle
    }

    /// Searches the Discogs database and returns release and master results in response order.
    ///
    /// Pinned artist/title fields are sent as dedicated search parameters next to the free text.
    #[instrument(skip(self), fields(query = %query.text))]
    pub async fn search_releases(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Candidate>, DiscogsError> {
        let cache_key = format!(
            "{}|{}|{}",
            query.text,
            query.forced_artist.as_deref().unwrap_or_default(),
            query.forced_title.as_deref().unwrap_or_default()
        );
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let search_url = format!("{}/database/search", self.base_url);
        debug!(target: "discogs", url = %search_url, "Searching Discogs releases");

        let mut params = vec![("q", query.text.as_str())];
        if let Some(artist) = query.forced_artist.as_deref() {
            params.push(("artist", artist));
        }
        if let Some(title) = query.forced_title.as_deref() {
            params.push(("title", title));
        }

        let response = {
            let permit = self.throttle.acquire().await;
            let response = self
                .request(self.client.get(&search_url))
                .query(&params)
                .send()
                .await?;
            permit.record(parse_remaining(response.headers()));
            response
        };
        let status = response.status();
        let body = response.text().await?;
        let value = parse_discogs_body(status, &body)?;
        let search: SearchResponse = serde_json::from_value(value)?;

        let candidates: Vec<Candidate> = search
            .results
            .into_iter()
            .filter_map(SearchResultItem::into_candidate)
            .collect();

        debug!(target: "discogs", count = candidates.len(), "Discogs search complete");
        self.cache.insert(cache_key, candidates.clone());
        Ok(candidates)
    }

    fn request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {
                // Discogs uses its own token scheme (not Bearer): "Discogs token=<value>"
                request.header("Authorization", format!("Discogs token={}", token.trim()))
            }
            _ => request,
        }
    }
}

#[async_trait]
impl MetadataSource for DiscogsClient {
    fn name(&self) -> &'static str {
        "discogs"
    }

    async fn search(&self, query: &SearchQuery) -> Option<Vec<Candidate>> {
        match self.search_releases(query).await {
            Ok(candidates) if !candidates.is_empty() => Some(candidates),
            Ok(_) => {
                debug!(target: "discogs", query = %query.text, "no Discogs results");
                None
            }
            Err(error) => {
                warn!(target: "discogs", query = %query.text, %error, "Discogs search failed, treating as no result");
                None
            }
        }
    }
}

/// Error type returned by the Discogs API client.
#[derive(Debug, Error)]
pub enum DiscogsError {
    /// An error occurred while performing the HTTP request (network or protocol failure).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Discogs responded with a non-success HTTP status code.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    /// Discogs returned a JSON payload with a `message` field indicating an API-level error.
    #[error("Discogs API error: {message}")]
    Api { message: String },
    /// Failed to deserialize the Discogs JSON response into the expected types.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize, Clone)]
struct SearchResultItem {
    id: Option<u64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    year: Option<YearField>,
    thumb: Option<String>,
    cover_image: Option<String>,
    #[serde(default)]
    genre: Option<Vec<String>>,
    #[serde(default)]
    style: Option<Vec<String>>,
    #[serde(default)]
    format: Option<Vec<String>>,
}

/// Discogs reports `year` as a string in search results and as a number elsewhere.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum YearField {
    Number(u32),
    Text(String),
}

impl YearField {
    fn value(&self) -> Option<u32> {
        match self {
            YearField::Number(year) => Some(*year),
            YearField::Text(text) => text.trim().parse().ok(),
        }
        .filter(|year| *year > 0)
    }
}

impl SearchResultItem {
    fn into_candidate(self) -> Option<Candidate> {
        let title = self.title.filter(|title| !title.trim().is_empty())?;
        let year = self.year.as_ref().and_then(YearField::value);
        let cover_art_url = self
            .cover_image
            .filter(|url| !url.is_empty())
            .or(self.thumb)
            .filter(|url| !url.is_empty());
        let genres = self.genre.unwrap_or_default();
        let styles = self.style.unwrap_or_default();
        let mut format_tags: BTreeSet<String> = self.format.unwrap_or_default().into_iter().collect();

        match self.kind.as_deref() {
            Some("release") => Some(Candidate::Release(ReleaseCandidate {
                id: self.id,
                title,
                year,
                cover_art_url,
                genres,
                styles,
                format_tags,
            })),
            Some("master") => {
                format_tags.insert("Album".to_string());
                Some(Candidate::Album(AlbumCandidate {
                    master_id: self.id,
                    title,
                    year,
                    cover_art_url,
                    genres,
                    styles,
                    format_tags,
                }))
            }
            _ => None,
        }
    }
}

fn parse_remaining(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(RATELIMIT_REMAINING_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn parse_discogs_body(status: StatusCode, response_body: &str) -> Result<Value, DiscogsError> {
    if !status.is_success() {
        return Err(DiscogsError::HttpStatus {
            status,
            body: response_body.to_string(),
        });
    }

    let value: Value = serde_json::from_str(response_body)?;
    if let Some(message) = value.get("message").and_then(|message| message.as_str()) {
        return Err(DiscogsError::Api {
            message: message.to_string(),
        });
    }

    Ok(value)
}
