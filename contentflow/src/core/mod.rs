//! Core domain model types for contentflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Job status, event status and fan-out role enums
//! - Stage output and artifacts
//! - Progress events, stage records and the final bundle

mod artifact;
mod bundle;
mod event;
mod output;
mod record;
mod status;

pub use artifact::StageArtifact;
pub use bundle::{ArtifactBundle, BundleSummary, SkippedStage};
pub use event::{EventDraft, ProgressEvent, PIPELINE_STAGE};
pub use output::{Outcome, StageOutput};
pub use record::StageRecord;
pub use status::{EventStatus, FanOutRole, JobStatus};
