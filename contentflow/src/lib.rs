//! # Contentflow
//!
//! A pipeline orchestration engine for multi-format content generation.
//!
//! A single submitted topic runs through a validated graph of stages:
//!
//! - **Graph validation**: cycles, unknown dependencies, the single interrupt
//!   point and fan-out roles are checked once, at build time
//! - **Fan-out/merge**: a planner's tasks run concurrently behind a full
//!   barrier and merge in task order
//! - **Human-in-the-loop**: jobs pause after planning until approved, with
//!   optional plan edits
//! - **Progress**: every stage transition is an ordered event, available as a
//!   live stream with heartbeats or through pull queries
//! - **Cancellation and retry**: cooperative cancellation at every boundary,
//!   backoff with jitter for transient failures
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contentflow::prelude::*;
//!
//! let graph = content_graph(ContentStages::from_config(&StagesConfig::default()))?;
//! let registry = Arc::new(JobRegistry::new(Arc::new(EventBus::default())));
//! let orchestrator = Orchestrator::new(graph, Arc::clone(&registry));
//! let gateway = ProgressGateway::new(registry);
//!
//! let job_id = orchestrator.submit(JobRequest::new("Quantum Computing"))?;
//! let mut events = gateway.subscribe(job_id)?;
//! while let Some(item) = events.next().await {
//!     println!("{item:?}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod jobs;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ContentflowConfig, GatewayConfig, StagesConfig};
    pub use crate::context::{GenerationOptions, JobRequest, Plan, StageContext, TaskInput, Tone};
    pub use crate::core::{
        ArtifactBundle, EventStatus, FanOutRole, JobStatus, ProgressEvent, StageArtifact,
        StageOutput,
    };
    pub use crate::errors::{
        GraphConfigurationError, PipelineError, RegistryError, StageError,
        SubmitError,
    };
    pub use crate::events::{EventBus, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gateway::{EventStream, ProgressGateway, StatusReport, StreamItem};
    pub use crate::jobs::{JobId, JobRegistry, ResumeDecision};
    pub use crate::pipeline::{
        content_graph, GraphBuilder, Orchestrator, PipelineGraph, RetryConfig, StageDescriptor,
    };
    pub use crate::stages::content::ContentStages;
    pub use crate::stages::Stage;
}
