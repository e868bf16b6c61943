//! Testing utilities for contentflow pipelines.
//!
//! This module provides:
//! - Scripted mock stages
//! - A small fan-out graph and an engine harness
//! - Assertions for stage outputs and event logs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_event_log, assert_output_contains, assert_output_produced, assert_output_skipped,
    statuses_of,
};
pub use fixtures::{fast_retry, TestGraph, TestHarness};
pub use mocks::{CollectStage, MockStage, PlanStage, ReverseStage};
