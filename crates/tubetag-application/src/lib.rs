// SPDX-License-Identifier: GPL-3.0-or-later
pub mod media_probe;
pub mod pipeline;
pub mod query;
pub mod queue;
pub mod ranking;
pub mod rename;
pub mod similarity;
pub mod tag_container;
pub mod tagging;

pub use media_probe::{LoftyMediaProbe, MediaProbe, TempoEnrichment, TempoEstimator};
pub use pipeline::{ForcedMatch, ResolveError, TagResolutionPipeline};
pub use queue::{JobHandle, QueueError, TaggingJob, TaggingQueue};
pub use rename::{RenameError, RenamePlan};
pub use tag_container::{LoftyTagContainer, TagContainer, TagContainerError, TagSet};
pub use tagging::{TaggingError, TaggingOptions, TaggingOutcome, TaggingRequest, TaggingService};
