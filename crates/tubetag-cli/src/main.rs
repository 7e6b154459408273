// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};
use tubetag_application::{
    ForcedMatch, LoftyTagContainer, TagResolutionPipeline, TaggingJob, TaggingOptions,
    TaggingQueue, TaggingRequest, TaggingService,
};
use tubetag_config::{load as load_config, AppConfig};
use tubetag_domain::VideoInfo;
use tubetag_metadata::{
    DiscogsClient, KeyedSource, MetadataSource, QuotaThrottle, ShazamClient, ThumbnailClient,
    VagalumeClient,
};

/// Tag downloaded media files with metadata resolved from their names.
#[derive(Parser, Debug)]
#[command(name = "tubetag")]
#[command(version)]
struct Args {
    /// Files to tag
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "TUBETAG_CONFIG")]
    config: Option<PathBuf>,

    /// Source video URL, stored in the comment tag and used to recognise the file on later runs
    #[arg(long)]
    url: Option<String>,

    /// Video title; defaults to the file name
    #[arg(long)]
    title: Option<String>,

    /// Uploader name
    #[arg(long, default_value = "")]
    author: String,

    /// Video thumbnail URL, used when no cover art is found
    #[arg(long)]
    thumbnail: Option<String>,

    /// Pin the artist instead of guessing it from the file name
    #[arg(long)]
    artist: Option<String>,

    /// Pin the track title instead of guessing it from the file name
    #[arg(long = "track-title")]
    track_title: Option<String>,

    /// Clear previously written tags and rename after the video title
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = init_tracing();
    let config = load_config(args.config.as_deref())?;
    if let Some(filter) = &filter {
        apply_log_level(filter, &config.telemetry.log_level);
    }

    if !args.reset && !config.tagging.inject_tags {
        warn!(target: "cli", "tag injection is disabled in the configuration, nothing to do");
        return Ok(());
    }

    let queue = TaggingQueue::new(Arc::new(build_service(&config)), &config.queue);
    let cancel = queue.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "cli", "interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let jobs: Vec<TaggingJob> = args.files.iter().map(|path| job_for(&args, path)).collect();
    let results = queue.run_all(jobs).await;

    let mut failed = 0usize;
    for (path, result) in args.files.iter().zip(results) {
        match result {
            Ok(outcome) if outcome.is_successful() => {
                info!(target: "cli", file = %path.display(), result = %outcome.path.display(), renamed = outcome.renamed, "tagged");
            }
            Ok(outcome) => {
                warn!(target: "cli", file = %outcome.path.display(), "no confident metadata match");
            }
            Err(error) => {
                failed += 1;
                warn!(target: "cli", file = %path.display(), %error, "tagging failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files could not be tagged", args.files.len());
    }
    Ok(())
}

/// Level used until the configuration has been read.
const STARTUP_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber before anything logs. Without `RUST_LOG` the filter
/// is reloadable so `telemetry.log_level` can take over once config is loaded.
fn init_tracing() -> Option<FilterHandle> {
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true).with_level(true))
                .init();
            None
        }
        Err(_) => {
            let (filter, handle) = reload::Layer::new(EnvFilter::new(STARTUP_LOG_LEVEL));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_level(true))
                .init();
            Some(handle)
        }
    }
}

fn apply_log_level(filter: &FilterHandle, level: &str) {
    if let Err(error) = filter.reload(EnvFilter::new(level)) {
        warn!(target: "cli", %error, level, "could not apply configured log level");
    }
}

/// Wire the configured sources into a tagging service. The Discogs client is
/// shared by every job so its quota is tracked once per process.
fn build_service(config: &AppConfig) -> TaggingService {
    let discogs = Arc::new(DiscogsClient::new_with_quota(
        config.discogs.token.clone(),
        QuotaThrottle::new(
            config.discogs.quota_floor,
            Duration::from_secs(config.discogs.quota_cooldown_secs),
        ),
        Duration::from_secs(config.discogs.timeout_secs),
        config.discogs.base_url.clone(),
    ));

    let shazam = KeyedSource::new(
        ShazamClient::new(config.shazam.base_url.clone()),
        config.shazam.api_keys.clone(),
        Duration::from_secs(config.shazam.timeout_secs),
    );
    let vagalume = KeyedSource::new(
        VagalumeClient::new(config.vagalume.base_url.clone()),
        config.vagalume.api_keys.clone(),
        Duration::from_secs(config.vagalume.timeout_secs),
    );
    let song_sources: Vec<Arc<dyn MetadataSource>> = vec![Arc::new(shazam), Arc::new(vagalume)];
    info!(
        target: "cli",
        discogs_token = config.discogs.token.is_some(),
        shazam_keys = config.shazam.api_keys.len(),
        vagalume_keys = config.vagalume.api_keys.len(),
        "metadata sources configured"
    );

    let pipeline = Arc::new(TagResolutionPipeline::new(discogs, song_sources));
    TaggingService::new(
        pipeline,
        Arc::new(LoftyTagContainer),
        Arc::new(ThumbnailClient::default()),
        TaggingOptions::from(&config.tagging),
    )
}

fn video_for(args: &Args, path: &Path) -> VideoInfo {
    let title = args.title.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    VideoInfo {
        url: args.url.clone().unwrap_or_default(),
        title,
        author: args.author.clone(),
        thumbnail_url: args.thumbnail.clone(),
    }
}

fn job_for(args: &Args, path: &Path) -> TaggingJob {
    let video = video_for(args, path);
    if args.reset {
        return TaggingJob::Reset {
            path: path.to_path_buf(),
            video,
        };
    }
    let forced = ForcedMatch::new(args.artist.as_deref(), args.track_title.as_deref());
    TaggingJob::Inject(TaggingRequest::new(path, video).with_forced(forced))
}
