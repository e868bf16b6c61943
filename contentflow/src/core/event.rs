//! Progress event type published for every stage transition.

use super::EventStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stage name used for job-level events (submission and terminal outcome).
pub const PIPELINE_STAGE: &str = "pipeline";

/// An immutable progress notice, totally ordered per job by `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Per-job sequence number, starting at 1.
    pub seq: u64,
    /// The job the event belongs to.
    pub job_id: Uuid,
    /// The stage that emitted it, or `"pipeline"`.
    pub stage: String,
    /// Status tag.
    pub status: EventStatus,
    /// Human-readable message.
    pub message: String,
    /// Structured metrics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Set only on the final job-level event.
    #[serde(default)]
    pub terminal: bool,
}

/// An event before it has been sequenced by its job.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Stage name.
    pub stage: String,
    /// Status tag.
    pub status: EventStatus,
    /// Human-readable message.
    pub message: String,
    /// Structured metrics.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Terminal flag.
    pub terminal: bool,
}

impl EventDraft {
    /// Creates a new draft.
    #[must_use]
    pub fn new(stage: impl Into<String>, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status,
            message: message.into(),
            metrics: BTreeMap::new(),
            terminal: false,
        }
    }

    /// Creates a "started" draft.
    #[must_use]
    pub fn started(stage: &str) -> Self {
        Self::new(stage, EventStatus::Started, format!("{stage} started"))
    }

    /// Creates a "working" draft.
    #[must_use]
    pub fn working(stage: &str, message: impl Into<String>) -> Self {
        Self::new(stage, EventStatus::Working, message)
    }

    /// Creates a "completed" draft.
    #[must_use]
    pub fn completed(stage: &str) -> Self {
        Self::new(stage, EventStatus::Completed, format!("{stage} completed"))
    }

    /// Creates an "error" draft.
    #[must_use]
    pub fn error(stage: &str, message: impl Into<String>) -> Self {
        Self::new(stage, EventStatus::Error, message)
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Adds every metric from a map.
    #[must_use]
    pub fn with_metrics(mut self, metrics: BTreeMap<String, serde_json::Value>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    /// Marks the draft as the job's terminal event.
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Seals the draft into an event.
    #[must_use]
    pub fn into_event(self, job_id: Uuid, seq: u64) -> ProgressEvent {
        ProgressEvent {
            seq,
            job_id,
            stage: self.stage,
            status: self.status,
            message: self.message,
            metrics: self.metrics,
            timestamp: Utc::now(),
            terminal: self.terminal,
        }
    }
}
