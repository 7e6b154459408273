// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::cmp::Reverse;
use tracing::{debug, instrument};
use tubetag_domain::{Candidate, SearchQuery, SongCandidate};

use crate::keyed::{KeyedSearch, SongSearchError};

const VAGALUME_API_BASE: &str = "https://api.vagalume.com.br";

/// Vagalume lyrics-catalogue search (`search.artmus`).
///
/// Documents come back as a mix of artist and song entries; only song entries
/// (those with a title) become candidates, ordered by how many radio stations
/// play them.
pub struct VagalumeClient {
    client: Client,
    base_url: String,
}

impl VagalumeClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| VAGALUME_API_BASE.to_string())
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
        let mut url = Url::parse(&format!("{}/search.artmus", self.base_url))
            .map_err(|source| SongSearchError::InvalidBaseUrl(source.to_string()))?;
        url.query_pairs_mut()
            .append_pair("apikey", api_key)
            .append_pair("q", &query.text)
            .append_pair("limit", "20");

        debug!(target: "vagalume", base_url = %self.base_url, "Searching Vagalume");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SongSearchError::HttpStatus { status, body });
        }

        let payload: VagalumeSearchResponse = serde_json::from_str(&body)?;
        let candidates = rank_docs(payload.response.map(|r| r.docs).unwrap_or_default());

        debug!(target: "vagalume", count = candidates.len(), "Vagalume search complete");
        Ok(candidates)
    }
}

#[async_trait]
impl KeyedSearch for VagalumeClient {
    fn name(&self) -> &'static str {
        "vagalume"
    }

    async fn search_with_key(
        &self,
        query: &SearchQuery,
        api_key: &str,
    ) -> Result<Vec<Candidate>, SongSearchError> {
        self.search_songs(query, api_key).await
    }
}

fn rank_docs(docs: Vec<VagalumeDoc>) -> Vec<Candidate> {
    let mut songs: Vec<SongCandidate> = docs
        .into_iter()
        .filter_map(|doc| {
            let title = doc.title.filter(|title| !title.trim().is_empty())?;
            Some(SongCandidate {
                title,
                artist: doc.band.filter(|band| !band.trim().is_empty()),
                cover_art_url: None,
                popularity: doc.fm_radios.map(|radios| radios.len() as u32).unwrap_or(0),
                format_tags: Default::default(),
            })
        })
        .collect();
    // Stable: equal popularity keeps response order.
    songs.sort_by_key(|song| Reverse(song.popularity));
    songs.into_iter().map(Candidate::Song).collect()
}

#[derive(Debug, Deserialize)]
struct VagalumeSearchResponse {
    response: Option<VagalumeDocs>,
}

#[derive(Debug, Deserialize)]
struct VagalumeDocs {
    #[serde(default)]
    docs: Vec<VagalumeDoc>,
}

#[derive(Debug, Deserialize)]
struct VagalumeDoc {
    band: Option<String>,
    title: Option<String>,
    #[serde(rename = "fmRadios")]
    fm_radios: Option<Vec<serde_json::Value>>,
}
