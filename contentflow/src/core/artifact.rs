//! Stage artifact type for capturing bundle outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An artifact produced by a stage.
///
/// Artifacts are the deliverables collected into the final bundle: the
/// article, its sections, images, social posts, audio and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    /// The kind of artifact (e.g., "article", "section", "social").
    #[serde(rename = "type")]
    pub kind: String,

    /// Identifier, unique within the job.
    pub id: String,

    /// Display name.
    pub name: String,

    /// The stage that produced it; stamped by the orchestrator.
    #[serde(default)]
    pub stage: String,

    /// Fan-out task index, for parallel-unit artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_index: Option<usize>,

    /// The artifact content.
    pub data: serde_json::Value,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// When the artifact was created.
    pub created_at: DateTime<Utc>,
}

impl StageArtifact {
    /// Creates a new stage artifact.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name: name.into(),
            stage: String::new(),
            task_index: None,
            data,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Stamps the producing stage and task index.
    #[must_use]
    pub fn stamped(mut self, stage: &str, task_index: Option<usize>) -> Self {
        self.stage = stage.to_string();
        self.task_index = task_index;
        self
    }

    /// The fields that identify the artifact's content, excluding timestamps.
    pub(crate) fn digest_view(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.kind,
            "id": self.id,
            "name": self.name,
            "stage": self.stage,
            "task_index": self.task_index,
            "data": self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = StageArtifact::new(
            "social",
            "social-linkedin",
            "linkedin",
            serde_json::json!({"text": "hello"}),
        )
        .with_metadata("chars", serde_json::json!(5));

        assert_eq!(artifact.kind, "social");
        assert_eq!(artifact.metadata.len(), 1);
        assert!(artifact.stage.is_empty());
    }

    #[test]
    fn test_stamped_and_serialized() {
        let artifact = StageArtifact::new("section", "section-1", "Intro", serde_json::json!({}))
            .stamped("section_writer", Some(1));

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "section");
        assert_eq!(json["stage"], "section_writer");
        assert_eq!(json["task_index"], 1);
    }
}
