// SPDX-License-Identifier: GPL-3.0-or-later

//! Optional tempo enrichment.
//!
//! Tempo detection itself is pluggable ([`TempoEstimator`]); this module only
//! supplies it with the stream bitrate.

use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use tubetag_domain::MediaFormat;

/// Bitrate handed to the estimator when the stream could not be probed.
pub const DEFAULT_BITRATE_KBPS: u32 = 44100;

pub trait MediaProbe: Send + Sync {
    /// Average decoded stream size in bytes per second, if the file can be probed.
    fn average_bytes_per_second(&self, path: &Path) -> Option<u32>;
}

pub trait TempoEstimator: Send + Sync {
    fn estimate_bpm(&self, path: &Path, bitrate_kbps: u32) -> Option<u32>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyMediaProbe;

impl MediaProbe for LoftyMediaProbe {
    fn average_bytes_per_second(&self, path: &Path) -> Option<u32> {
        let tagged_file = Probe::open(path).ok()?.read().ok()?;
        // lofty reports kbps.
        let kbps = tagged_file.properties().audio_bitrate()?;
        Some(kbps * 1000 / 8)
    }
}

#[derive(Clone)]
pub struct TempoEnrichment {
    probe: Arc<dyn MediaProbe>,
    estimator: Arc<dyn TempoEstimator>,
}

impl TempoEnrichment {
    pub fn new(probe: Arc<dyn MediaProbe>, estimator: Arc<dyn TempoEstimator>) -> Self {
        Self { probe, estimator }
    }

    /// Only WAV and MP3 streams are probed; other formats use the default bitrate.
    pub fn bitrate_kbps(&self, path: &Path, format: MediaFormat) -> u32 {
        let probed = match format {
            MediaFormat::Wav | MediaFormat::Mp3 => self.probe.average_bytes_per_second(path),
            _ => None,
        };
        probed
            .map(|bytes_per_second| bytes_per_second * 8 / 1000)
            .unwrap_or(DEFAULT_BITRATE_KBPS)
    }

    pub fn estimate(&self, path: &Path, format: MediaFormat) -> Option<u32> {
        let bitrate = self.bitrate_kbps(path, format);
        let bpm = self.estimator.estimate_bpm(path, bitrate);
        debug!(target: "tagging", path = %path.display(), bitrate, ?bpm, "tempo estimated");
        bpm
    }
}
