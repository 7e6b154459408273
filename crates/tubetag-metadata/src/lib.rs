// SPDX-License-Identifier: GPL-3.0-or-later

//! Metadata source clients.
//!
//! Every source is exposed through [`MetadataSource`]: free text in, an ordered
//! list of candidates out. Transport and decoding failures stay visible on each
//! client's inherent methods but are folded into "no result" at the trait
//! boundary, so callers never branch on why a source had nothing.

pub mod discogs;
pub mod keyed;
pub mod quota;
pub mod shazam;
pub mod thumbnail;
pub mod vagalume;

use async_trait::async_trait;
use tubetag_domain::{Candidate, SearchQuery};

pub use discogs::{DiscogsClient, DiscogsError};
pub use keyed::{KeyedSearch, KeyedSource, SongSearchError};
pub use quota::QuotaThrottle;
pub use shazam::ShazamClient;
pub use thumbnail::{CoverArtFetcher, ThumbnailClient, ThumbnailError};
pub use vagalume::VagalumeClient;

/// Search-by-free-text contract shared by all metadata sources.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// `None` when the source found nothing, failed, or returned something unparseable.
    /// `Some` always carries at least one candidate.
    async fn search(&self, query: &SearchQuery) -> Option<Vec<Candidate>>;
}
