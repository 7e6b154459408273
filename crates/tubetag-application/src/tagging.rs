// SPDX-License-Identifier: GPL-3.0-or-later

//! Tagging of one downloaded file: resolve metadata, write tags, rename.
//!
//! Source lookups never fail a file. The errors surfaced here are local ones
//! (unsupported file, tag container I/O, rename I/O) and cancellation. The
//! rename is always the last step, so a cancelled job never leaves a file
//! half-renamed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tubetag_config::TaggingConfig;
use tubetag_domain::{MediaFormat, TagDecision, VideoInfo};
use tubetag_metadata::CoverArtFetcher;

use crate::media_probe::TempoEnrichment;
use crate::pipeline::{ForcedMatch, ResolveError, TagResolutionPipeline};
use crate::rename::{apply_rename, plan_rename, plan_target, RenameError, RenamePlan};
use crate::tag_container::{TagContainer, TagContainerError, TagSet};

#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("tagging was cancelled")]
    Cancelled,
    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("tag container error: {0}")]
    Tags(#[from] TagContainerError),
    #[error("rename error: {0}")]
    Rename(#[from] RenameError),
    #[error("blocking task failed: {0}")]
    Join(#[from] task::JoinError),
}

impl From<ResolveError> for TaggingError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Cancelled => TaggingError::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaggingOptions {
    pub auto_rename: bool,
    /// File-name template for [`TaggingService::reset_tags`]; `$title` and `$author` are expanded.
    pub rename_template: String,
}

impl Default for TaggingOptions {
    fn default() -> Self {
        Self::from(&TaggingConfig::default())
    }
}

impl From<&TaggingConfig> for TaggingOptions {
    fn from(config: &TaggingConfig) -> Self {
        Self {
            auto_rename: config.auto_rename,
            rename_template: config.rename_template.clone(),
        }
    }
}

/// One file to tag and the video it came from.
#[derive(Debug, Clone)]
pub struct TaggingRequest {
    pub path: PathBuf,
    pub video: VideoInfo,
    pub forced: ForcedMatch,
}

impl TaggingRequest {
    pub fn new(path: impl Into<PathBuf>, video: VideoInfo) -> Self {
        Self {
            path: path.into(),
            video,
            forced: ForcedMatch::default(),
        }
    }

    pub fn with_forced(mut self, forced: ForcedMatch) -> Self {
        self.forced = forced;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggingOutcome {
    /// Where the file ended up (renamed or original).
    pub path: PathBuf,
    /// `None` for video files, which are not resolved.
    pub decision: Option<TagDecision>,
    pub renamed: bool,
}

impl TaggingOutcome {
    pub fn is_successful(&self) -> bool {
        self.decision.as_ref().map_or(true, |decision| decision.matched)
    }
}

pub struct TaggingService {
    pipeline: Arc<TagResolutionPipeline>,
    tags: Arc<dyn TagContainer>,
    covers: Arc<dyn CoverArtFetcher>,
    tempo: Option<TempoEnrichment>,
    options: TaggingOptions,
}

impl TaggingService {
    pub fn new(
        pipeline: Arc<TagResolutionPipeline>,
        tags: Arc<dyn TagContainer>,
        covers: Arc<dyn CoverArtFetcher>,
        options: TaggingOptions,
    ) -> Self {
        Self {
            pipeline,
            tags,
            covers,
            tempo: None,
            options,
        }
    }

    pub fn with_tempo(mut self, tempo: TempoEnrichment) -> Self {
        self.tempo = Some(tempo);
        self
    }

    /// Tag one file. Video containers get cover and channel only; audio goes through resolution.
    #[instrument(skip(self, request, cancel), fields(path = %request.path.display()))]
    pub async fn inject_tags(
        &self,
        request: &TaggingRequest,
        cancel: &CancellationToken,
    ) -> Result<TaggingOutcome, TaggingError> {
        let format = media_format(&request.path)?;
        if !request.path.exists() {
            return Err(TaggingError::FileNotFound(request.path.display().to_string()));
        }

        if format.is_video() {
            self.inject_video_tags(request, cancel).await
        } else {
            self.inject_audio_tags(request, format, cancel).await
        }
    }

    async fn inject_video_tags(
        &self,
        request: &TaggingRequest,
        cancel: &CancellationToken,
    ) -> Result<TaggingOutcome, TaggingError> {
        let cover = self.fetch_cover(None, &request.video, cancel).await?;
        check(cancel)?;

        let tags = Arc::clone(&self.tags);
        let path = request.path.clone();
        let channel = request.video.author.clone();
        blocking(move || {
            let mut current = tags.read_tags(&path)?;
            current.channel = Some(channel);
            current.front_cover = cover;
            tags.write_tags(&path, &current)
        })
        .await?;

        info!(target: "tagging", path = %request.path.display(), "video tags written");
        Ok(TaggingOutcome {
            path: request.path.clone(),
            decision: None,
            renamed: false,
        })
    }

    async fn inject_audio_tags(
        &self,
        request: &TaggingRequest,
        format: MediaFormat,
        cancel: &CancellationToken,
    ) -> Result<TaggingOutcome, TaggingError> {
        let raw_title = request
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let decision = self.pipeline.resolve(&raw_title, &request.forced, cancel).await?;
        let cover = self
            .fetch_cover(decision.cover_art_url.as_deref(), &request.video, cancel)
            .await?;

        let bpm = match self.tempo.clone() {
            Some(tempo) => {
                let path = request.path.clone();
                task::spawn_blocking(move || tempo.estimate(&path, format)).await?
            }
            None => None,
        };

        check(cancel)?;
        let tags = Arc::clone(&self.tags);
        let path = request.path.clone();
        let url = request.video.url.clone();
        let resolved = decision.clone();
        blocking(move || {
            let mut current = tags.read_tags(&path)?;
            merge_decision(&mut current, &resolved);
            if !url.is_empty() {
                current.comment = Some(url);
            }
            if cover.is_some() {
                current.front_cover = cover;
            }
            if bpm.is_some() {
                current.beats_per_minute = bpm;
            }
            tags.write_tags(&path, &current)
        })
        .await?;
        debug!(target: "tagging", path = %request.path.display(), matched = decision.matched, "audio tags written");

        if !(self.options.auto_rename && decision.matched) {
            return Ok(TaggingOutcome {
                path: request.path.clone(),
                decision: Some(decision),
                renamed: false,
            });
        }

        check(cancel)?;
        let tags = Arc::clone(&self.tags);
        let path = request.path.clone();
        let url = request.video.url.clone();
        let resolved = decision.clone();
        let (final_path, renamed) = blocking(move || {
            let plan = plan_rename(&path, &resolved, &url, tags.as_ref())?;
            let renamed = plan != RenamePlan::Unchanged;
            Ok::<_, TaggingError>((apply_rename(&path, &plan)?, renamed))
        })
        .await?;

        Ok(TaggingOutcome {
            path: final_path,
            decision: Some(decision),
            renamed,
        })
    }

    /// Undo a previous tagging run: clear resolved fields, restore the video
    /// thumbnail as cover, and rename the file after the video.
    #[instrument(skip(self, path, video, cancel), fields(path = %path.display()))]
    pub async fn reset_tags(
        &self,
        path: &Path,
        video: &VideoInfo,
        cancel: &CancellationToken,
    ) -> Result<TaggingOutcome, TaggingError> {
        media_format(path)?;
        if !path.exists() {
            return Err(TaggingError::FileNotFound(path.display().to_string()));
        }

        let cover = self.fetch_cover(None, video, cancel).await?;
        check(cancel)?;

        let tags = Arc::clone(&self.tags);
        let owned_path = path.to_path_buf();
        let stem = render_template(&self.options.rename_template, video);
        let url = video.url.clone();
        let (final_path, renamed) = blocking(move || {
            let mut current = tags.read_tags(&owned_path)?;
            clear_resolved(&mut current);
            current.front_cover = cover;
            tags.write_tags(&owned_path, &current)?;

            let plan = plan_target(&owned_path, &stem, &url, tags.as_ref())?;
            let renamed = plan != RenamePlan::Unchanged;
            Ok::<_, TaggingError>((apply_rename(&owned_path, &plan)?, renamed))
        })
        .await?;

        info!(target: "tagging", path = %final_path.display(), "tags reset");
        Ok(TaggingOutcome {
            path: final_path,
            decision: None,
            renamed,
        })
    }

    /// Fetch `preferred`, falling back to the video thumbnail. A failed fetch means no picture.
    async fn fetch_cover(
        &self,
        preferred: Option<&str>,
        video: &VideoInfo,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, TaggingError> {
        let thumbnail = video.thumbnail_url.as_deref();
        let urls = [preferred, thumbnail.filter(|url| Some(*url) != preferred)];

        for url in urls.into_iter().flatten() {
            check(cancel)?;
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TaggingError::Cancelled),
                fetched = self.covers.fetch_cover(url) => fetched,
            };
            if let Some(bytes) = fetched {
                return Ok(Some(bytes.to_vec()));
            }
            debug!(target: "tagging", url, "cover unavailable, trying fallback");
        }

        if preferred.is_some() || thumbnail.is_some() {
            warn!(target: "tagging", video = %video.url, "no cover image could be fetched");
        }
        Ok(None)
    }
}

/// Copy each resolved field that is set; unset fields keep the file's current value.
fn merge_decision(tags: &mut TagSet, decision: &TagDecision) {
    if let Some(title) = &decision.title {
        tags.title = Some(title.clone());
    }
    if let Some(album) = &decision.album {
        tags.album = Some(album.clone());
    }
    if !decision.performers.is_empty() {
        tags.performers = decision.performers.clone();
    }
    if !decision.genres.is_empty() {
        tags.genres = decision.genres.clone();
    }
    if let Some(year) = decision.year {
        tags.year = Some(year);
    }
    if let Some(description) = &decision.description {
        tags.description = Some(description.clone());
    }
}

fn clear_resolved(tags: &mut TagSet) {
    tags.title = None;
    tags.album = None;
    tags.performers.clear();
    tags.genres.clear();
    tags.year = None;
    tags.description = None;
    tags.beats_per_minute = None;
}

pub fn render_template(template: &str, video: &VideoInfo) -> String {
    template
        .replace("$title", &video.title)
        .replace("$author", &video.author)
}

fn media_format(path: &Path) -> Result<MediaFormat, TaggingError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    MediaFormat::from_extension(&extension)
        .ok_or_else(|| TaggingError::UnsupportedFormat(path.display().to_string()))
}

fn check(cancel: &CancellationToken) -> Result<(), TaggingError> {
    if cancel.is_cancelled() {
        return Err(TaggingError::Cancelled);
    }
    Ok(())
}

async fn blocking<T, E, F>(work: F) -> Result<T, TaggingError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<TaggingError> + Send + 'static,
{
    task::spawn_blocking(work).await?.map_err(Into::into)
}
