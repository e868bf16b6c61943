//! One execution instance and its accumulated state.

use crate::cancellation::CancellationToken;
use crate::context::{JobRequest, Plan};
use crate::core::{
    ArtifactBundle, EventDraft, EventStatus, JobStatus, ProgressEvent, StageRecord,
    PIPELINE_STAGE,
};
use crate::errors::{PipelineError, RegistryError};
use crate::events::EventBus;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

/// Job identifier.
pub type JobId = Uuid;

/// Progress of a single stage, derived from its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageProgress {
    /// Not started yet.
    Pending,
    /// Started, retrying, or (for parallel units) tasks in flight.
    Running,
    /// Finished with output.
    Completed,
    /// Finished without output.
    Skipped,
    /// Failed.
    Failed,
}

impl fmt::Display for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a job failed or was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorDetail {
    /// Machine-readable tag (`stage_error`, `barrier_failure`, `cancelled`, ...).
    pub kind: String,
    /// The error message, verbatim.
    pub message: String,
    /// The stage the error is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// A resume decision for a job paused at the interrupt point.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    /// Continue with the plan as produced.
    Approve,
    /// Continue with an edited plan. Validated on resume.
    ApproveWithEdits(serde_json::Value),
}

/// The terminal outcome handed to [`JobHandle::finalize`].
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The evaluator succeeded and the bundle is assembled.
    Completed(ArtifactBundle),
    /// A stage or barrier failed.
    Failed(PipelineError),
    /// The job was cancelled, with the reason.
    Cancelled(String),
}

/// A consistent point-in-time copy of a job's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job id.
    pub id: JobId,
    /// The submitted request.
    pub request: JobRequest,
    /// Current status.
    pub status: JobStatus,
    /// The ordered event log.
    pub events: Vec<ProgressEvent>,
    /// Completed stage records, in completion order.
    pub records: Vec<StageRecord>,
    /// Per-stage progress for enabled stages.
    pub progress: BTreeMap<String, StageProgress>,
    /// The plan persisted at the interrupt point.
    pub plan: Option<Plan>,
    /// The final bundle; set only when completed.
    pub bundle: Option<ArtifactBundle>,
    /// The error; set only when failed or cancelled.
    pub error: Option<JobErrorDetail>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When the orchestrator picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Shared handle to a job.
///
/// All mutable state sits behind one lock. Events are appended to the log and
/// published on the bus under the write lock, so log order equals publish
/// order and a subscriber's history/receiver pair never misses or repeats an
/// event.
pub struct JobHandle {
    id: JobId,
    request: Arc<JobRequest>,
    state: RwLock<JobSnapshot>,
    bus: Arc<EventBus>,
    cancel: Arc<CancellationToken>,
    resume_tx: Mutex<Option<oneshot::Sender<ResumeDecision>>>,
}

impl JobHandle {
    /// Creates a pending job and opens its bus channel.
    #[must_use]
    pub fn new(request: JobRequest, bus: Arc<EventBus>) -> Self {
        let id = Uuid::new_v4();
        bus.open(id);
        Self {
            id,
            request: Arc::new(request.clone()),
            state: RwLock::new(JobSnapshot {
                id,
                request,
                status: JobStatus::Pending,
                events: Vec::new(),
                records: Vec::new(),
                progress: BTreeMap::new(),
                plan: None,
                bundle: None,
                error: None,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            }),
            bus,
            cancel: Arc::new(CancellationToken::new()),
            resume_tx: Mutex::new(None),
        }
    }

    /// The job id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The submitted request.
    #[must_use]
    pub fn request(&self) -> &Arc<JobRequest> {
        &self.request
    }

    /// The job's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    /// Returns a cloned snapshot of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        self.state.read().clone()
    }

    /// The persisted plan.
    #[must_use]
    pub fn plan(&self) -> Option<Plan> {
        self.state.read().plan.clone()
    }

    /// Completed stage records.
    #[must_use]
    pub fn records(&self) -> Vec<StageRecord> {
        self.state.read().records.clone()
    }

    /// Number of events in the log.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.state.read().events.len()
    }

    /// Appends an event to the log and publishes it.
    ///
    /// Returns `None` once the job is terminal; nothing follows the terminal
    /// event.
    pub fn publish(&self, draft: EventDraft) -> Option<ProgressEvent> {
        let mut state = self.state.write();
        if state.status.is_terminal() {
            debug!(job_id = %self.id, stage = %draft.stage, "Dropping event for terminal job");
            return None;
        }
        Some(self.append(&mut state, draft))
    }

    fn append(&self, state: &mut JobSnapshot, draft: EventDraft) -> ProgressEvent {
        let seq = state.events.len() as u64 + 1;
        let event = draft.into_event(self.id, seq);
        if event.stage != PIPELINE_STAGE {
            let skipped = event.metrics.get("skipped") == Some(&serde_json::Value::Bool(true));
            let current = state.progress.get(&event.stage).copied();
            let progress = match (event.status, current) {
                // A settled stage may still report, e.g. the approval pause.
                (
                    EventStatus::Working,
                    Some(settled @ (StageProgress::Completed | StageProgress::Skipped)),
                ) => settled,
                (EventStatus::Started | EventStatus::Working, _) => StageProgress::Running,
                (EventStatus::Completed, _) if skipped => StageProgress::Skipped,
                (EventStatus::Completed, _) => StageProgress::Completed,
                (EventStatus::Error, _) => StageProgress::Failed,
            };
            state.progress.insert(event.stage.clone(), progress);
        }
        state.events.push(event.clone());
        self.bus.publish(&event);
        event
    }

    /// Atomically snapshots the history and subscribes to live events.
    ///
    /// The receiver is `None` once the job is terminal.
    #[must_use]
    pub fn subscribe(&self) -> (Vec<ProgressEvent>, Option<broadcast::Receiver<ProgressEvent>>) {
        let state = self.state.read();
        (state.events.clone(), self.bus.subscribe(self.id))
    }

    /// Events with `seq > after`, in order.
    #[must_use]
    pub fn events_since(&self, after: u64) -> Vec<ProgressEvent> {
        let state = self.state.read();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(state.events.len());
        state.events[start..].to_vec()
    }

    /// Seeds the progress map with the stages enabled for this job.
    pub fn init_progress<'a>(&self, stages: impl IntoIterator<Item = &'a str>) {
        let mut state = self.state.write();
        for stage in stages {
            state
                .progress
                .entry(stage.to_string())
                .or_insert(StageProgress::Pending);
        }
    }

    /// Moves a pending job to `Running`. Returns false if it is not pending.
    pub fn mark_running(&self) -> bool {
        let mut state = self.state.write();
        if state.status != JobStatus::Pending {
            return false;
        }
        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
        true
    }

    /// Appends a completed stage record.
    pub fn record(&self, record: StageRecord) {
        self.state.write().records.push(record);
    }

    /// Persists the approved plan.
    pub fn set_plan(&self, plan: Plan) {
        self.state.write().plan = Some(plan);
    }

    /// Pauses the job at the interrupt point.
    ///
    /// Persists the plan, moves to `AwaitingApproval` and publishes the pause
    /// event. The returned receiver resolves on [`JobHandle::resume`]. Returns
    /// `None` if the job is no longer running.
    pub fn await_approval(
        &self,
        stage: &str,
        plan: Plan,
    ) -> Option<oneshot::Receiver<ResumeDecision>> {
        let mut state = self.state.write();
        if !state.status.can_transition_to(JobStatus::AwaitingApproval) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        *self.resume_tx.lock() = Some(tx);
        let tasks = plan.task_count();
        state.plan = Some(plan);
        state.status = JobStatus::AwaitingApproval;
        self.append(
            &mut state,
            EventDraft::working(stage, "Plan ready; awaiting approval")
                .with_metric("awaiting_approval", serde_json::json!(true))
                .with_metric("tasks", serde_json::json!(tasks)),
        );
        info!(job_id = %self.id, stage, tasks, "Job awaiting approval");
        Some(rx)
    }

    /// Resumes a job paused at the interrupt point.
    pub fn resume(&self, decision: ResumeDecision) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        match state.status {
            JobStatus::AwaitingApproval => {}
            status if status.is_terminal() => {
                return Err(RegistryError::AlreadyTerminal {
                    job_id: self.id,
                    status,
                })
            }
            status => {
                return Err(RegistryError::NotAwaitingApproval {
                    job_id: self.id,
                    status,
                })
            }
        }

        let edited_plan = match &decision {
            ResumeDecision::Approve => None,
            ResumeDecision::ApproveWithEdits(value) => Some(Plan::from_value(value.clone())?),
        };

        let tx = self.resume_tx.lock().take().ok_or(RegistryError::NotAwaitingApproval {
            job_id: self.id,
            status: state.status,
        })?;
        let edited = edited_plan.is_some();
        if let Some(plan) = edited_plan {
            state.plan = Some(plan);
        }
        state.status = JobStatus::Running;
        self.append(
            &mut state,
            EventDraft::working(PIPELINE_STAGE, "Plan approved; resuming")
                .with_metric("edited", serde_json::json!(edited)),
        );
        drop(state);

        // The orchestrator may have been dropped; the job is then finalized by cancel.
        let _ = tx.send(decision);
        info!(job_id = %self.id, edited, "Job resumed");
        Ok(())
    }

    /// Requests cancellation.
    ///
    /// A job with nothing in flight (pending or awaiting approval) is
    /// finalized immediately; a running job is finalized by its orchestrator
    /// at the next boundary.
    pub fn cancel(&self, reason: &str) -> Result<(), RegistryError> {
        let status = self.status();
        if status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal {
                job_id: self.id,
                status,
            });
        }
        self.cancel.cancel(reason);
        if matches!(status, JobStatus::Pending | JobStatus::AwaitingApproval) {
            self.finalize(JobOutcome::Cancelled(reason.to_string()));
        }
        Ok(())
    }

    /// Applies the terminal transition and the terminal event, at most once.
    ///
    /// Returns false if the job was already terminal.
    pub fn finalize(&self, outcome: JobOutcome) -> bool {
        let mut state = self.state.write();
        if state.status.is_terminal() {
            debug!(job_id = %self.id, status = %state.status, "Job already finalized");
            return false;
        }

        let draft = match outcome {
            JobOutcome::Completed(bundle) => {
                let draft = EventDraft::new(PIPELINE_STAGE, EventStatus::Completed, "Job completed")
                    .with_metric("artifacts", serde_json::json!(bundle.artifacts.len()))
                    .with_metric("word_count", serde_json::json!(bundle.summary.word_count))
                    .with_metric("fact_check_score", serde_json::json!(bundle.summary.fact_check_score))
                    .with_metric("quality_score", serde_json::json!(bundle.summary.quality_score));
                state.status = JobStatus::Completed;
                state.bundle = Some(bundle);
                draft
            }
            JobOutcome::Failed(error) => {
                let detail = JobErrorDetail {
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                    stage: error.stage().map(str::to_string),
                };
                let mut draft = EventDraft::error(PIPELINE_STAGE, detail.message.clone())
                    .with_metric("kind", serde_json::json!(detail.kind));
                if let Some(stage) = &detail.stage {
                    draft = draft.with_metric("stage", serde_json::json!(stage));
                }
                state.status = JobStatus::Failed;
                state.error = Some(detail);
                draft
            }
            JobOutcome::Cancelled(reason) => {
                let message = format!("Job cancelled: {reason}");
                state.status = JobStatus::Cancelled;
                state.error = Some(JobErrorDetail {
                    kind: "cancelled".to_string(),
                    message: message.clone(),
                    stage: None,
                });
                EventDraft::error(PIPELINE_STAGE, message)
                    .with_metric("cancelled", serde_json::json!(true))
            }
        };
        state.completed_at = Some(Utc::now());
        self.resume_tx.lock().take();
        let event = self.append(&mut state, draft.terminal());
        self.bus.close(self.id);
        info!(job_id = %self.id, status = %state.status, seq = event.seq, "Job finalized");
        true
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
