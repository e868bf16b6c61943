//! Jobs and the registry that owns them.

mod job;
mod registry;

pub use job::{
    JobErrorDetail, JobHandle, JobId, JobOutcome, JobSnapshot, ResumeDecision, StageProgress,
};
pub use registry::JobRegistry;
