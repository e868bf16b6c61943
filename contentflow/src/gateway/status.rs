//! Point-in-time status reports for polling clients.

use crate::context::Plan;
use crate::core::{ArtifactBundle, JobStatus, ProgressEvent};
use crate::jobs::{JobErrorDetail, JobId, JobSnapshot, StageProgress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The status of a job as seen by a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Job id.
    pub job_id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// The submitted topic.
    pub topic: String,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When the job started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-stage progress of the enabled stages.
    pub progress: BTreeMap<String, StageProgress>,
    /// Share of enabled stages that completed or were skipped, 0 to 100.
    pub percent_complete: u8,
    /// The most recent events, oldest first.
    pub latest_events: Vec<ProgressEvent>,
    /// Total events emitted so far.
    pub event_count: usize,
    /// The plan; only while awaiting approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// The error, when failed or cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorDetail>,
    /// The bundle, when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<ArtifactBundle>,
}

impl StatusReport {
    /// Builds a report from a snapshot, keeping the last `latest` events.
    #[must_use]
    pub fn from_snapshot(snapshot: JobSnapshot, latest: usize) -> Self {
        let event_count = snapshot.events.len();
        let latest_events = snapshot.events[event_count.saturating_sub(latest)..].to_vec();
        let settled = snapshot
            .progress
            .values()
            .filter(|p| matches!(p, StageProgress::Completed | StageProgress::Skipped))
            .count();
        let percent_complete = if snapshot.status == JobStatus::Completed {
            100
        } else {
            percent(settled, snapshot.progress.len())
        };

        Self {
            job_id: snapshot.id,
            status: snapshot.status,
            topic: snapshot.request.topic,
            created_at: snapshot.created_at,
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
            progress: snapshot.progress,
            percent_complete,
            latest_events,
            event_count,
            plan: snapshot
                .plan
                .filter(|_| snapshot.status == JobStatus::AwaitingApproval),
            error: snapshot.error,
            bundle: snapshot.bundle,
        }
    }
}

fn percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(part.min(total) * 100 / total).unwrap_or(100)
}
