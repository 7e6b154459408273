// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Search input
// ============================================================================

/// Free-text metadata query, optionally pinned to a human-supplied artist/title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub forced_artist: Option<String>,
    pub forced_title: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            forced_artist: None,
            forced_title: None,
        }
    }

    /// Build a query from a manual override. The text becomes `"{artist} - {title}"`.
    pub fn forced(artist: Option<&str>, title: Option<&str>) -> Self {
        let artist = artist.map(str::trim).filter(|value| !value.is_empty());
        let title = title.map(str::trim).filter(|value| !value.is_empty());
        Self {
            text: format!("{} - {}", artist.unwrap_or_default(), title.unwrap_or_default()),
            forced_artist: artist.map(str::to_string),
            forced_title: title.map(str::to_string),
        }
    }

    /// Containment scoring replaces similarity scoring when either field is pinned.
    pub fn is_forced(&self) -> bool {
        self.forced_artist.is_some() || self.forced_title.is_some()
    }
}

/// Kind of structured result being sought when ranking release candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Single,
    Album,
}

impl Intent {
    /// Format tags that earn the tie-break bonus for this intent.
    pub fn expected_format_tags(&self) -> &'static [&'static str] {
        match self {
            Intent::Single => &["Single", "File"],
            Intent::Album => &["Album"],
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Single => write!(f, "single"),
            Intent::Album => write!(f, "album"),
        }
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// A release entry from the structured source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReleaseCandidate {
    pub id: Option<u64>,
    pub title: String,
    pub year: Option<u32>,
    pub cover_art_url: Option<String>,
    pub genres: Vec<String>,
    pub styles: Vec<String>,
    pub format_tags: BTreeSet<String>,
}

/// A master/album entry from the structured source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlbumCandidate {
    pub master_id: Option<u64>,
    pub title: String,
    pub year: Option<u32>,
    pub cover_art_url: Option<String>,
    pub genres: Vec<String>,
    pub styles: Vec<String>,
    pub format_tags: BTreeSet<String>,
}

/// A song hit from one of the song-search sources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SongCandidate {
    pub title: String,
    pub artist: Option<String>,
    pub cover_art_url: Option<String>,
    /// Source-specific popularity signal; song sources order their hits by it.
    pub popularity: u32,
    pub format_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Candidate {
    Release(ReleaseCandidate),
    Album(AlbumCandidate),
    Song(SongCandidate),
}

impl Candidate {
    pub fn title(&self) -> &str {
        match self {
            Candidate::Release(release) => &release.title,
            Candidate::Album(album) => &album.title,
            Candidate::Song(song) => &song.title,
        }
    }

    /// Text compared against the query. Songs are compared as `"{artist} - {title}"`.
    pub fn similarity_input(&self) -> String {
        match self {
            Candidate::Song(song) => match song.artist.as_deref() {
                Some(artist) => format!("{} - {}", artist, song.title),
                None => song.title.clone(),
            },
            other => other.title().to_string(),
        }
    }

    pub fn artist(&self) -> Option<&str> {
        match self {
            Candidate::Song(song) => song.artist.as_deref(),
            _ => None,
        }
    }

    /// Song-source popularity; structured candidates carry none.
    pub fn popularity(&self) -> u32 {
        match self {
            Candidate::Song(song) => song.popularity,
            _ => 0,
        }
    }

    pub fn year(&self) -> Option<u32> {
        match self {
            Candidate::Release(release) => release.year,
            Candidate::Album(album) => album.year,
            Candidate::Song(_) => None,
        }
    }

    pub fn cover_art_url(&self) -> Option<&str> {
        match self {
            Candidate::Release(release) => release.cover_art_url.as_deref(),
            Candidate::Album(album) => album.cover_art_url.as_deref(),
            Candidate::Song(song) => song.cover_art_url.as_deref(),
        }
    }

    pub fn genres(&self) -> &[String] {
        match self {
            Candidate::Release(release) => &release.genres,
            Candidate::Album(album) => &album.genres,
            Candidate::Song(_) => &[],
        }
    }

    pub fn styles(&self) -> &[String] {
        match self {
            Candidate::Release(release) => &release.styles,
            Candidate::Album(album) => &album.styles,
            Candidate::Song(_) => &[],
        }
    }

    pub fn format_tags(&self) -> &BTreeSet<String> {
        match self {
            Candidate::Release(release) => &release.format_tags,
            Candidate::Album(album) => &album.format_tags,
            Candidate::Song(song) => &song.format_tags,
        }
    }

    pub fn has_any_format_tag(&self, tags: &[&str]) -> bool {
        let own = self.format_tags();
        tags.iter().any(|tag| own.contains(*tag))
    }
}

/// The best candidate for a query together with its similarity to the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// Percentage in `(-inf, 100]`; negative when the candidate is much longer than the query.
    pub similarity_percent: f64,
}

// ============================================================================
// Decision
// ============================================================================

/// Resolved metadata for one file. `matched == false` means nothing cleared a threshold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagDecision {
    pub title: Option<String>,
    pub performers: Vec<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genres: Vec<String>,
    pub description: Option<String>,
    pub cover_art_url: Option<String>,
    pub matched: bool,
    pub confidence_percent: f64,
    /// Path-safe file stem derived from the resolved fields.
    pub file_stem: String,
}

// ============================================================================
// Media
// ============================================================================

/// The video a file was downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub author: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp3,
    Wav,
    Ogg,
    Mp4,
}

impl MediaFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "ogg" => Some(Self::Ogg),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Mp4 => "mp4",
        }
    }

    pub fn is_music(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Wav | Self::Ogg)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Mp4)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
