//! Stage output type with factory methods.

use super::StageArtifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a stage produced a result or declined to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The stage produced its output.
    Produced,
    /// The stage declined (or, for optional stages, failed) and was skipped.
    Skipped {
        /// Why the stage was skipped.
        reason: String,
    },
}

impl Default for Outcome {
    fn default() -> Self {
        Self::Produced
    }
}

/// The output of a stage execution.
///
/// `StageOutput` is immutable once recorded by the orchestrator. Failures are
/// not outputs; they travel as [`crate::errors::StageError`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Produced or skipped.
    #[serde(default)]
    pub outcome: Outcome,

    /// The output data, visible to downstream stages.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,

    /// Artifacts destined for the final bundle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,

    /// Metrics attached to the stage's completion event.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl StageOutput {
    /// Creates a produced output with data.
    #[must_use]
    pub fn ok(data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Creates a produced output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::default()
    }

    /// Creates a produced output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a skipped output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
            ..Self::default()
        }
    }

    /// Adds a data entry.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Adds an artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: StageArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Replaces the artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<StageArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Returns true if the stage was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    /// Returns the skip reason, if skipped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Skipped { reason } => Some(reason),
            Outcome::Produced => None,
        }
    }

    /// Gets a value from the data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string value from the data.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns the data as a JSON object.
    #[must_use]
    pub fn data_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StageOutput::ok_value("result", serde_json::json!("success"));
        assert_eq!(output.outcome, Outcome::Produced);
        assert!(!output.is_skipped());
        assert_eq!(output.get_str("result"), Some("success"));
    }

    #[test]
    fn test_skip_output() {
        let output = StageOutput::skip("tts unavailable");
        assert!(output.is_skipped());
        assert_eq!(output.skip_reason(), Some("tts unavailable"));
        assert!(output.data.is_empty());
    }

    #[test]
    fn test_builders() {
        let artifact = StageArtifact::new("section", "s-0", "Intro", serde_json::json!({}));
        let output = StageOutput::ok_empty()
            .with_value("count", serde_json::json!(3))
            .with_artifact(artifact)
            .with_metric("words", serde_json::json!(120));

        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.metrics.get("words"), Some(&serde_json::json!(120)));
        assert_eq!(output.data_value(), serde_json::json!({"count": 3}));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(StageOutput::skip("declined")).unwrap();
        assert_eq!(
            json["outcome"],
            serde_json::json!({"kind": "skipped", "reason": "declined"})
        );

        let back: StageOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back.skip_reason(), Some("declined"));
    }
}
