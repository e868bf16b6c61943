//! The final deliverable of a completed job.

use super::{StageArtifact, StageRecord};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use uuid::Uuid;

static SCORE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Score:\s*(\d+)/10").ok());

/// A stage that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStage {
    /// Stage name.
    pub stage: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Headline numbers extracted from the artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    /// Words in the merged article.
    pub word_count: usize,
    /// Fact-check score out of 10.
    pub fact_check_score: Option<u8>,
    /// Overall quality score from the evaluator.
    pub quality_score: Option<f64>,
    /// Number of social assets.
    pub social_assets: usize,
    /// Number of generated images.
    pub images: usize,
}

/// The ordered set of deliverables for a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    /// The job id.
    pub job_id: Uuid,
    /// The submitted topic.
    pub topic: String,
    /// Article title.
    pub title: String,
    /// Artifacts in graph order; fan-out artifacts by task index.
    pub artifacts: Vec<StageArtifact>,
    /// Stages that were skipped.
    pub skipped: Vec<SkippedStage>,
    /// Summary metrics.
    pub summary: BundleSummary,
    /// Hex SHA-256 over the artifact contents.
    pub digest: String,
    /// When the bundle was assembled.
    pub generated_at: DateTime<Utc>,
}

impl ArtifactBundle {
    /// Assembles a bundle from records already sorted into graph order.
    #[must_use]
    pub fn assemble<'a>(
        job_id: Uuid,
        topic: &str,
        records: impl IntoIterator<Item = &'a StageRecord>,
    ) -> Self {
        let mut artifacts = Vec::new();
        let mut skipped = Vec::new();
        for record in records {
            if let Some(reason) = record.output.skip_reason() {
                skipped.push(SkippedStage {
                    stage: record.stage.clone(),
                    reason: reason.to_string(),
                });
            }
            artifacts.extend(record.output.artifacts.iter().cloned());
        }

        let article = artifacts.iter().find(|a| a.kind == "article");
        let title = article
            .and_then(|a| a.data.get("title"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(topic)
            .to_string();
        let word_count = article
            .and_then(|a| a.data.get("content"))
            .and_then(serde_json::Value::as_str)
            .map_or(0, |c| c.split_whitespace().count());

        let summary = BundleSummary {
            word_count,
            fact_check_score: artifacts
                .iter()
                .find(|a| a.kind == "fact_check")
                .and_then(fact_check_score),
            quality_score: artifacts
                .iter()
                .find(|a| a.kind == "evaluation")
                .and_then(|a| a.data.get("overall_score"))
                .and_then(serde_json::Value::as_f64),
            social_assets: artifacts.iter().filter(|a| a.kind == "social").count(),
            images: artifacts.iter().filter(|a| a.kind == "image").count(),
        };

        let digest = digest_artifacts(&artifacts);

        Self {
            job_id,
            topic: topic.to_string(),
            title,
            artifacts,
            skipped,
            summary,
            digest,
            generated_at: Utc::now(),
        }
    }

    /// Returns the artifacts of one kind, in bundle order.
    pub fn artifacts_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a StageArtifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }
}

/// Reads the fact-check score, falling back to the "Score: N/10" line of the
/// report text.
fn fact_check_score(artifact: &StageArtifact) -> Option<u8> {
    if let Some(score) = artifact.data.get("score").and_then(serde_json::Value::as_u64) {
        return u8::try_from(score).ok();
    }
    let report = artifact.data.get("report")?.as_str()?;
    let pattern = SCORE_PATTERN.as_ref()?;
    pattern.captures(report)?.get(1)?.as_str().parse().ok()
}

fn digest_artifacts(artifacts: &[StageArtifact]) -> String {
    let mut hasher = Sha256::new();
    for artifact in artifacts {
        hasher.update(artifact.digest_view().to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
