//! Pipeline graphs and their execution.
//!
//! This module provides:
//! - Stage descriptors and the validating graph builder
//! - The graph cursor that decides each next step
//! - The standard content graph
//! - Retry policy and the job orchestrator

mod builder;
mod content;
mod graph;
mod orchestrator;
mod retry;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::GraphBuilder;
pub use content::content_graph;
pub use graph::{GraphCursor, NextStep, PipelineGraph};
pub use orchestrator::Orchestrator;
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryState};
pub use spec::{EnablePredicate, StageDescriptor};
