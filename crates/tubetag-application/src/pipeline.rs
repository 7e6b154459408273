// SPDX-License-Identifier: GPL-3.0-or-later

//! Metadata resolution for one file.
//!
//! The pipeline is a linear chain of stages:
//! 1. Single release: best structured-source candidate for [`Intent::Single`]
//! 2. Album: the same candidate list ranked for [`Intent::Album`]
//! 3. Song search: the keyed song sources, only when the structured stages were inconclusive
//!
//! Every stage runs at most once per invocation. Source failures never fail the
//! pipeline; the only early exit is cancellation.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use tubetag_domain::{Candidate, Intent, RankedCandidate, SearchQuery, TagDecision};
use tubetag_metadata::MetadataSource;

use crate::query::{clean_candidate_title, clean_raw_title, first_segment, last_segment, split_performers};
use crate::ranking::{rank, satisfies_forced};
use crate::rename::sanitize_file_stem;
use crate::similarity::similarity_percent;

/// Similarity a single release must exceed.
pub const SINGLE_THRESHOLD: f64 = 30.0;
/// Album titles accrue more incidental distance, so the bar is lower.
pub const ALBUM_THRESHOLD: f64 = 20.0;
/// Similarity a song-search hit must exceed (and it must also beat the running best).
pub const SONG_THRESHOLD: f64 = 30.0;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("metadata resolution was cancelled")]
    Cancelled,
}

/// Stages of one resolution, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    TrySingleRelease,
    TryAlbum,
    TrySongSources,
    Done,
}

/// Human-supplied override for artist and/or title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedMatch {
    pub artist: Option<String>,
    pub title: Option<String>,
}

impl ForcedMatch {
    pub fn new(artist: Option<&str>, title: Option<&str>) -> Self {
        let keep = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            artist: keep(artist),
            title: keep(title),
        }
    }

    pub fn is_set(&self) -> bool {
        self.artist.is_some() || self.title.is_some()
    }
}

pub struct TagResolutionPipeline {
    structured: Arc<dyn MetadataSource>,
    /// Tried in order; the first source with any answer is the only one consulted.
    song_sources: Vec<Arc<dyn MetadataSource>>,
}

/// Invocation-local state carried from stage to stage.
struct Resolution {
    decision: TagDecision,
    best_confidence: f64,
    /// Running file-name guess, replaced by cleaned candidate titles as stages accept.
    guess: String,
    single_found: bool,
    album_found: bool,
    song_found: bool,
}

impl Resolution {
    fn new(query: &SearchQuery) -> Self {
        Self {
            decision: TagDecision::default(),
            best_confidence: 0.0,
            guess: query.text.clone(),
            single_found: false,
            album_found: false,
            song_found: false,
        }
    }

    fn observe(&mut self, confidence: f64) {
        if confidence > self.best_confidence {
            self.best_confidence = confidence;
        }
    }

    fn finish(mut self) -> TagDecision {
        self.decision.matched = self.single_found || self.album_found || self.song_found;
        self.decision.confidence_percent = self.best_confidence;
        self.decision.file_stem = sanitize_file_stem(&self.guess);
        self.decision
    }
}

impl TagResolutionPipeline {
    pub fn new(structured: Arc<dyn MetadataSource>, song_sources: Vec<Arc<dyn MetadataSource>>) -> Self {
        Self {
            structured,
            song_sources,
        }
    }

    /// Build the query for a raw title, switching to forced mode when an override is present.
    pub fn build_query(raw_title: &str, forced: &ForcedMatch) -> SearchQuery {
        if forced.is_set() {
            SearchQuery::forced(forced.artist.as_deref(), forced.title.as_deref())
        } else {
            SearchQuery::new(clean_raw_title(raw_title))
        }
    }

    /// Resolve metadata for `raw_title` (a file name or video title).
    ///
    /// Cancellation is checked between stages and while any source call is in flight.
    #[instrument(skip(self, cancel))]
    pub async fn resolve(
        &self,
        raw_title: &str,
        forced: &ForcedMatch,
        cancel: &CancellationToken,
    ) -> Result<TagDecision, ResolveError> {
        let query = Self::build_query(raw_title, forced);
        let mut state = Resolution::new(&query);
        debug!(target: "pipeline", stage = ?Stage::Start, query = %query.text, forced = query.is_forced(), "resolving");

        let releases = guarded(cancel, self.structured.search(&query))
            .await?
            .unwrap_or_default();

        debug!(target: "pipeline", stage = ?Stage::TrySingleRelease, candidates = releases.len());
        if let Some(single) = rank(&releases, &query, Intent::Single) {
            self.try_single(&mut state, &query, single);
        }

        check(cancel)?;
        debug!(target: "pipeline", stage = ?Stage::TryAlbum);
        if let Some(album) = rank(&releases, &query, Intent::Album) {
            self.try_album(&mut state, &query, album);
        }

        let structured_matched = state.single_found || state.album_found;
        if !structured_matched || state.best_confidence < SONG_THRESHOLD {
            check(cancel)?;
            debug!(target: "pipeline", stage = ?Stage::TrySongSources, best_confidence = state.best_confidence);
            self.try_song_sources(&mut state, &query, cancel).await?;
        }

        let decision = state.finish();
        info!(
            target: "pipeline",
            stage = ?Stage::Done,
            matched = decision.matched,
            confidence = decision.confidence_percent,
            title = decision.title.as_deref().unwrap_or_default(),
            "resolution finished"
        );
        Ok(decision)
    }

    fn try_single(&self, state: &mut Resolution, query: &SearchQuery, ranked: RankedCandidate) {
        let confidence = ranked.similarity_percent;
        state.observe(confidence);
        let accepted = confidence > SINGLE_THRESHOLD
            || (query.is_forced() && satisfies_forced(&ranked.candidate, query));
        debug!(target: "pipeline", title = ranked.candidate.title(), confidence, accepted, "single release candidate");
        if !accepted {
            return;
        }

        let candidate = &ranked.candidate;
        let name = clean_candidate_title(candidate.title());
        let title = last_segment(&name).map(str::to_string);
        let decision = &mut state.decision;

        decision.performers = first_segment(&name).map(split_performers).unwrap_or_default();
        decision.album = title.clone();
        decision.title = title;
        if !candidate.genres().is_empty() {
            decision.genres = candidate.genres().to_vec();
        }
        if !candidate.styles().is_empty() {
            decision.description = Some(candidate.styles().join(", "));
        }
        decision.cover_art_url = candidate.cover_art_url().map(str::to_string);

        state.guess = name;
        state.single_found = true;
    }

    fn try_album(&self, state: &mut Resolution, query: &SearchQuery, ranked: RankedCandidate) {
        let confidence = ranked.similarity_percent;
        state.observe(confidence);
        let accepted = confidence > ALBUM_THRESHOLD
            || (query.is_forced() && satisfies_forced(&ranked.candidate, query));
        debug!(target: "pipeline", title = ranked.candidate.title(), confidence, accepted, "album candidate");
        if !accepted {
            return;
        }

        let candidate = &ranked.candidate;
        let name = clean_candidate_title(candidate.title());
        let decision = &mut state.decision;

        decision.album = last_segment(&name).map(str::to_string);
        if let Some(year) = candidate.year() {
            decision.year = Some(year);
        }
        if let Some(cover) = candidate.cover_art_url() {
            decision.cover_art_url = Some(cover.to_string());
        }

        if !state.single_found {
            decision.performers = first_segment(&name).map(split_performers).unwrap_or_default();
            decision.title = last_segment(&state.guess).map(str::to_string);
        }
        state.album_found = true;
    }

    async fn try_song_sources(
        &self,
        state: &mut Resolution,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<(), ResolveError> {
        // Song sources search with the running guess; similarity stays anchored to the query.
        let song_query = SearchQuery {
            text: state.guess.clone(),
            forced_artist: query.forced_artist.clone(),
            forced_title: query.forced_title.clone(),
        };

        for source in &self.song_sources {
            let Some(candidates) = guarded(cancel, source.search(&song_query)).await? else {
                debug!(target: "pipeline", source = source.name(), "no song result");
                continue;
            };
            if let Some(top) = candidates.into_iter().next() {
                self.try_song(state, query, source.name(), top);
            }
            // First source with an answer decides, whether or not it was accepted.
            return Ok(());
        }
        Ok(())
    }

    fn try_song(&self, state: &mut Resolution, query: &SearchQuery, source: &str, candidate: Candidate) {
        let confidence = similarity_percent(&candidate.similarity_input(), &query.text);
        let accepted = if query.is_forced() {
            satisfies_forced(&candidate, query)
        } else {
            confidence > SONG_THRESHOLD && confidence > state.best_confidence
        };
        debug!(target: "pipeline", source, title = candidate.title(), confidence, accepted, "song candidate");
        state.observe(confidence);
        if !accepted {
            return;
        }

        let title = candidate.title().to_string();
        let decision = &mut state.decision;
        decision.title = Some(title.clone());
        decision.album = Some(title);
        decision.performers = candidate.artist().map(|artist| vec![artist.to_string()]).unwrap_or_default();
        decision.cover_art_url = candidate.cover_art_url().map(str::to_string);

        state.guess = candidate.similarity_input();
        state.song_found = true;
    }
}

fn check(cancel: &CancellationToken) -> Result<(), ResolveError> {
    if cancel.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }
    Ok(())
}

async fn guarded<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, ResolveError> {
    check(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResolveError::Cancelled),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tubetag_domain::{AlbumCandidate, ReleaseCandidate, SongCandidate};

    /// Returns a fixed answer and records every query it was asked.
    struct FixedSource {
        name: &'static str,
        answer: Option<Vec<Candidate>>,
        queries: Mutex<Vec<SearchQuery>>,
    }

    impl FixedSource {
        fn new(name: &'static str, answer: Option<Vec<Candidate>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer,
                queries: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<SearchQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetadataSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, query: &SearchQuery) -> Option<Vec<Candidate>> {
            self.queries.lock().unwrap().push(query.clone());
            self.answer.clone()
        }
    }

    /// Never answers; used to exercise cancellation of an in-flight call.
    struct HangingSource;

    #[async_trait]
    impl MetadataSource for HangingSource {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn search(&self, _query: &SearchQuery) -> Option<Vec<Candidate>> {
            std::future::pending().await
        }
    }

    fn release(title: &str, tags: &[&str]) -> Candidate {
        Candidate::Release(ReleaseCandidate {
            title: title.to_string(),
            format_tags: tags.iter().map(|tag| tag.to_string()).collect(),
            genres: vec!["Pop".to_string()],
            styles: vec!["Synth-pop".to_string(), "Europop".to_string()],
            cover_art_url: Some(format!("https://img.test/{}.jpg", title.len())),
            ..Default::default()
        })
    }

    fn album(title: &str, year: u32) -> Candidate {
        Candidate::Album(AlbumCandidate {
            title: title.to_string(),
            year: Some(year),
            format_tags: ["Album".to_string()].into_iter().collect(),
            cover_art_url: Some("https://img.test/album.jpg".to_string()),
            ..Default::default()
        })
    }

    fn song(artist: &str, title: &str) -> Candidate {
        Candidate::Song(SongCandidate {
            title: title.to_string(),
            artist: Some(artist.to_string()),
            cover_art_url: Some("https://img.test/song.jpg".to_string()),
            ..Default::default()
        })
    }

    fn pipeline(structured: Arc<FixedSource>, songs: Vec<Arc<FixedSource>>) -> TagResolutionPipeline {
        TagResolutionPipeline::new(
            structured,
            songs.into_iter().map(|source| source as Arc<dyn MetadataSource>).collect(),
        )
    }

    #[tokio::test]
    async fn junk_title_resolves_through_single_release() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![
                release("Rick Astley - Never Gonna Give You Up", &["Vinyl", "Single"]),
                release("Rick Astley - Whenever You Need Somebody", &["Album"]),
            ]),
        );
        let shazam = FixedSource::new("shazam", Some(vec![song("Someone", "Else")]));
        let pipeline = pipeline(structured.clone(), vec![shazam.clone()]);

        let decision = pipeline
            .resolve(
                "Rick Astley - Never Gonna Give You Up (Official Video) (4K Remaster).mp3",
                &ForcedMatch::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(decision.matched);
        assert_eq!(decision.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(decision.performers, vec!["Rick Astley"]);
        assert_eq!(decision.genres, vec!["Pop"]);
        assert_eq!(decision.description.as_deref(), Some("Synth-pop, Europop"));
        assert_eq!(decision.file_stem, "Rick Astley - Never Gonna Give You Up");
        assert_eq!(decision.confidence_percent, 100.0);
        assert_eq!(
            structured.calls()[0].text,
            "Rick Astley - Never Gonna Give You Up"
        );
        assert!(shazam.calls().is_empty(), "song sources must not run after a confident match");
    }

    #[tokio::test]
    async fn nothing_found_is_unmatched_with_empty_fields() {
        let structured = FixedSource::new("discogs", None);
        let shazam = FixedSource::new("shazam", None);
        let vagalume = FixedSource::new("vagalume", None);
        let pipeline = pipeline(structured, vec![shazam.clone(), vagalume.clone()]);

        let decision = pipeline
            .resolve("Unknown Garage Band - Demo 3.mp3", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!decision.matched);
        assert_eq!(decision.title, None);
        assert!(decision.performers.is_empty());
        assert_eq!(shazam.calls().len(), 1);
        assert_eq!(vagalume.calls().len(), 1);
    }

    #[tokio::test]
    async fn album_stage_fills_title_when_single_missed() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![album("Daft Punk - Discovery", 2001)]),
        );
        let pipeline = pipeline(structured, vec![]);

        let decision = pipeline
            .resolve("Daft Punk - Discovery.mp3", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        // The single stage sees the same candidate at 100% and accepts it too.
        assert!(decision.matched);
        assert_eq!(decision.album.as_deref(), Some("Discovery"));
        assert_eq!(decision.year, Some(2001));
        assert_eq!(decision.cover_art_url.as_deref(), Some("https://img.test/album.jpg"));
    }

    #[tokio::test]
    async fn album_only_match_takes_title_from_guess() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![album("Daft Punk - Homework (Special Anniversary Edition Box)", 1997)]),
        );
        let pipeline = pipeline(structured, vec![]);

        let decision = pipeline
            .resolve("Daft Punk - Da Funk.mp3", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        let confidence = similarity_percent(
            "Daft Punk - Homework (Special Anniversary Edition Box)",
            "Daft Punk - Da Funk",
        );
        assert!(confidence > ALBUM_THRESHOLD && confidence <= SINGLE_THRESHOLD, "{confidence}");
        assert!(decision.matched);
        assert_eq!(
            decision.album.as_deref(),
            Some("Homework (Special Anniversary Edition Box)")
        );
        assert_eq!(decision.title.as_deref(), Some("Da Funk"));
        assert_eq!(decision.performers, vec!["Daft Punk"]);
    }

    #[tokio::test]
    async fn weak_album_match_still_consults_song_sources() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![album("Daft Punk - Homework (Special Anniversary Edition Box)", 1997)]),
        );
        let shazam = FixedSource::new("shazam", Some(vec![song("Daft Punk", "Da Funk")]));
        let pipeline = pipeline(structured, vec![shazam.clone()]);

        let decision = pipeline
            .resolve("Daft Punk - Da Funk.mp3", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(shazam.calls().len(), 1);
        assert_eq!(shazam.calls()[0].text, "Daft Punk - Da Funk");
        assert!(decision.matched);
        assert_eq!(decision.title.as_deref(), Some("Da Funk"));
        assert_eq!(decision.album.as_deref(), Some("Da Funk"));
        assert_eq!(decision.year, Some(1997));
        assert_eq!(decision.cover_art_url.as_deref(), Some("https://img.test/song.jpg"));
        assert_eq!(decision.confidence_percent, 100.0);
    }

    #[test]
    fn song_hit_must_beat_running_best() {
        let pipeline = pipeline(FixedSource::new("discogs", None), vec![]);
        let query = SearchQuery::new("Daft Punk - One More Time");

        let mut state = Resolution::new(&query);
        state.best_confidence = 100.0;
        pipeline.try_song(&mut state, &query, "shazam", song("Daft Punk", "One More Time"));
        assert!(!state.song_found);
        assert_eq!(state.decision.title, None);

        let mut state = Resolution::new(&query);
        state.best_confidence = 99.0;
        pipeline.try_song(&mut state, &query, "shazam", song("Daft Punk", "One More Time"));
        assert!(state.song_found);
        assert_eq!(state.decision.title.as_deref(), Some("One More Time"));
    }

    #[tokio::test]
    async fn song_source_rescues_weak_structured_results() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![release("Various - Now That's What I Call Music 17", &["Compilation"])]),
        );
        let shazam = FixedSource::new("shazam", None);
        let vagalume = FixedSource::new(
            "vagalume",
            Some(vec![song("Legião Urbana", "Tempo Perdido"), song("Other", "Song")]),
        );
        let pipeline = pipeline(structured, vec![shazam.clone(), vagalume.clone()]);

        let decision = pipeline
            .resolve("Legião Urbana - Tempo Perdido.mp3", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(decision.matched);
        assert_eq!(decision.title.as_deref(), Some("Tempo Perdido"));
        assert_eq!(decision.album.as_deref(), Some("Tempo Perdido"));
        assert_eq!(decision.performers, vec!["Legião Urbana"]);
        assert_eq!(decision.file_stem, "Legião Urbana - Tempo Perdido");
        assert_eq!(shazam.calls()[0].text, "Legião Urbana - Tempo Perdido");
    }

    #[tokio::test]
    async fn first_answering_song_source_decides() {
        let structured = FixedSource::new("discogs", None);
        let shazam = FixedSource::new("shazam", Some(vec![song("Totally", "Different")]));
        let vagalume = FixedSource::new("vagalume", Some(vec![song("Daft Punk", "One More Time")]));
        let pipeline = pipeline(structured, vec![shazam, vagalume.clone()]);

        let decision = pipeline
            .resolve("Daft Punk - One More Time", &ForcedMatch::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!decision.matched);
        assert!(vagalume.calls().is_empty());
    }

    #[tokio::test]
    async fn forced_mode_matches_by_containment() {
        let structured = FixedSource::new(
            "discogs",
            Some(vec![release("ONE MORE TIME - DAFT PUNK", &["Single"])]),
        );
        let pipeline = pipeline(structured.clone(), vec![]);

        let decision = pipeline
            .resolve(
                "some unrelated upload name.mp3",
                &ForcedMatch::new(Some("Daft Punk"), Some("One More Time")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let query = &structured.calls()[0];
        assert_eq!(query.text, "Daft Punk - One More Time");
        assert_eq!(query.forced_artist.as_deref(), Some("Daft Punk"));
        assert!(decision.matched);
        assert_eq!(decision.title.as_deref(), Some("DAFT PUNK"));
    }

    #[tokio::test]
    async fn forced_song_requires_both_fields() {
        let structured = FixedSource::new("discogs", None);
        let shazam = FixedSource::new("shazam", Some(vec![song("Daft Punk", "Digital Love")]));
        let pipeline = pipeline(structured, vec![shazam]);

        let decision = pipeline
            .resolve(
                "x.mp3",
                &ForcedMatch::new(Some("Daft Punk"), Some("One More Time")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!decision.matched);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let structured = FixedSource::new("discogs", None);
        let pipeline = pipeline(structured.clone(), vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline.resolve("a - b", &ForcedMatch::default(), &cancel).await;

        assert_eq!(result, Err(ResolveError::Cancelled));
        assert!(structured.calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_call() {
        let pipeline = TagResolutionPipeline::new(Arc::new(HangingSource), vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = pipeline.resolve("a - b", &ForcedMatch::default(), &cancel).await;

        assert_eq!(result, Err(ResolveError::Cancelled));
    }
}
