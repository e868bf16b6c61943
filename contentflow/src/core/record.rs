//! Append-only record of a completed stage.

use super::StageOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed stage (or fan-out task) and its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Task index, for parallel-unit records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_index: Option<usize>,
    /// Attempts taken, including the successful one.
    pub attempts: usize,
    /// The recorded output.
    pub output: StageOutput,
    /// When the record was appended.
    pub recorded_at: DateTime<Utc>,
}

impl StageRecord {
    /// Creates a record, stamping every artifact with its origin.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        task_index: Option<usize>,
        attempts: usize,
        mut output: StageOutput,
    ) -> Self {
        let stage = stage.into();
        output.artifacts = output
            .artifacts
            .into_iter()
            .map(|a| a.stamped(&stage, task_index))
            .collect();
        Self {
            stage,
            task_index,
            attempts,
            output,
            recorded_at: Utc::now(),
        }
    }
}
