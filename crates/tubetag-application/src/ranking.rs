// SPDX-License-Identifier: GPL-3.0-or-later

//! Best-candidate selection for one source's result list.

use tracing::trace;
use tubetag_domain::{Candidate, Intent, RankedCandidate, SearchQuery};

use crate::query::contains_diacritic_free;
use crate::similarity::{distance, similarity_percent};

/// Pick the best candidate for `intent`, or `None` for an empty list.
///
/// Normal mode orders by negated edit distance to the query text; forced mode
/// by how many of the pinned artist/title terms the candidate title contains.
/// Either way a candidate carrying the intent's format tag gets one extra
/// point. The first of several equal scores wins.
pub fn rank(candidates: &[Candidate], query: &SearchQuery, intent: Intent) -> Option<RankedCandidate> {
    let mut best: Option<(i64, &Candidate)> = None;

    for candidate in candidates {
        let score = score(candidate, query, intent);
        trace!(target: "pipeline", %intent, score, title = candidate.title(), "scored candidate");
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, candidate)| RankedCandidate {
        candidate: candidate.clone(),
        similarity_percent: similarity_percent(&candidate.similarity_input(), &query.text),
    })
}

fn score(candidate: &Candidate, query: &SearchQuery, intent: Intent) -> i64 {
    let primary = if query.is_forced() {
        let title = candidate.similarity_input();
        let artist_hit = contains_diacritic_free(&title, query.forced_artist.as_deref().unwrap_or_default());
        let title_hit = contains_diacritic_free(&title, query.forced_title.as_deref().unwrap_or_default());
        i64::from(artist_hit) + i64::from(title_hit)
    } else {
        -(distance(&candidate.similarity_input(), &query.text) as i64)
    };
    let bonus = i64::from(candidate.has_any_format_tag(intent.expected_format_tags()));
    primary + bonus
}

/// Whether a candidate satisfies both pinned terms of a forced query.
///
/// Songs are checked field by field (artist against artist, title against
/// title); releases carry both in their title.
pub fn satisfies_forced(candidate: &Candidate, query: &SearchQuery) -> bool {
    let forced_artist = query.forced_artist.as_deref().unwrap_or_default();
    let forced_title = query.forced_title.as_deref().unwrap_or_default();
    match candidate {
        Candidate::Song(song) => {
            contains_diacritic_free(song.artist.as_deref().unwrap_or_default(), forced_artist)
                && contains_diacritic_free(&song.title, forced_title)
        }
        other => {
            contains_diacritic_free(other.title(), forced_artist)
                && contains_diacritic_free(other.title(), forced_title)
        }
    }
}
