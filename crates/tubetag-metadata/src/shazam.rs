// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument};
use tubetag_domain::{Candidate, SearchQuery, SongCandidate};

use crate::keyed::{KeyedSearch, SongSearchError};

const SHAZAM_API_BASE: &str = "https://shazam.p.rapidapi.com";
const SHAZAM_RAPIDAPI_HOST: &str = "shazam.p.rapidapi.com";
const SEARCH_LIMIT: &str = "20";

/// Shazam song search through RapidAPI. Wrap in [`crate::KeyedSource`] for key rotation.
pub struct ShazamClient {
    client: Client,
    base_url: String,
}

impl ShazamClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| SHAZAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    #[instrument(skip(self, api_key), fields(query = %query.text))]
    pub async fn search_songs(
        &self,
        query: &SearchQuery,
        api_key: &str,
    ) -> Result<Vec<Candidate>, SongSearchError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|source| SongSearchError::InvalidBaseUrl(source.to_string()))?;
        url.query_pairs_mut()
            .append_pair("term", &query.text)
            .append_pair("locale", "en-US")
            .append_pair("offset", "0")
            .append_pair("limit", SEARCH_LIMIT);

        debug!(target: "shazam", url = %url, "Searching Shazam");

        let response = self
            .client
            .get(url)
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", SHAZAM_RAPIDAPI_HOST)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let payload = parse_shazam_body(status, &body)?;

        let candidates: Vec<Candidate> = payload
            .tracks
            .map(|tracks| tracks.hits)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| hit.track.into_candidate())
            .collect();

        debug!(target: "shazam", count = candidates.len(), "Shazam search complete");
        Ok(candidates)
    }
}

#[async_trait]
impl KeyedSearch for ShazamClient {
    fn name(&self) -> &'static str {
        "shazam"
    }

    async fn search_with_key(
        &self,
        query: &SearchQuery,
        api_key: &str,
    ) -> Result<Vec<Candidate>, SongSearchError> {
        self.search_songs(query, api_key).await
    }
}

#[derive(Debug, Deserialize)]
struct ShazamSearchResponse {
    tracks: Option<ShazamTracks>,
}

#[derive(Debug, Deserialize)]
struct ShazamTracks {
    #[serde(default)]
    hits: Vec<ShazamHit>,
}

#[derive(Debug, Deserialize)]
struct ShazamHit {
    track: ShazamTrack,
}

#[derive(Debug, Deserialize)]
struct ShazamTrack {
    title: Option<String>,
    /// Shazam puts the artist credit in `subtitle`.
    subtitle: Option<String>,
    images: Option<ShazamImages>,
}

#[derive(Debug, Deserialize)]
struct ShazamImages {
    coverarthq: Option<String>,
    coverart: Option<String>,
}

impl ShazamTrack {
    fn into_candidate(self) -> Option<Candidate> {
        let title = self.title.filter(|title| !title.trim().is_empty())?;
        let cover_art_url = self
            .images
            .and_then(|images| images.coverarthq.or(images.coverart))
            .filter(|url| !url.is_empty());
        Some(Candidate::Song(SongCandidate {
            title,
            artist: self.subtitle.filter(|artist| !artist.trim().is_empty()),
            cover_art_url,
            popularity: 0,
            format_tags: Default::default(),
        }))
    }
}

fn parse_shazam_body(
    status: StatusCode,
    response_body: &str,
) -> Result<ShazamSearchResponse, SongSearchError> {
    if !status.is_success() {
        return Err(SongSearchError::HttpStatus {
            status,
            body: response_body.to_string(),
        });
    }

    // An unknown term comes back as `{}` (no `tracks`) or, occasionally, an empty body.
    if response_body.trim().is_empty() {
        return Ok(ShazamSearchResponse { tracks: None });
    }

    Ok(serde_json::from_str(response_body)?)
}
