//! What a job carries into its stages.
//!
//! This module provides:
//! - The immutable job request and generation options
//! - The plan persisted at the interrupt point
//! - The stage context handed to every `execute` call

mod plan;
mod request;
mod stage;

pub use plan::Plan;
pub use request::{GenerationOptions, JobRequest, Tone};
pub use stage::{ProgressReporter, StageContext, TaskInput};
