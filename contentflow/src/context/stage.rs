//! The read-only view a stage executes against.

use super::{JobRequest, Plan};
use crate::cancellation::CancellationToken;
use crate::core::{EventDraft, StageOutput};
use crate::jobs::JobHandle;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Input of one fan-out task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInput {
    /// Zero-based index within the group.
    pub index: usize,
    /// Group size.
    pub total: usize,
    /// The planned task.
    pub input: serde_json::Value,
}

/// Emits `working` events on behalf of a stage.
///
/// A detached reporter (no job attached) drops everything, which lets stages
/// run outside the orchestrator in tests.
#[derive(Clone)]
pub struct ProgressReporter {
    stage: String,
    task_index: Option<usize>,
    job: Option<Arc<JobHandle>>,
}

impl ProgressReporter {
    /// Creates a reporter that publishes to the job's log.
    #[must_use]
    pub fn attached(stage: &str, task_index: Option<usize>, job: Arc<JobHandle>) -> Self {
        Self {
            stage: stage.to_string(),
            task_index,
            job: Some(job),
        }
    }

    /// Creates a reporter that discards reports.
    #[must_use]
    pub fn detached(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            task_index: None,
            job: None,
        }
    }

    /// Publishes a `working` event.
    pub fn report(&self, message: impl Into<String>) {
        self.report_with(message, BTreeMap::new());
    }

    /// Publishes a `working` event with metrics.
    pub fn report_with(
        &self,
        message: impl Into<String>,
        metrics: BTreeMap<String, serde_json::Value>,
    ) {
        let Some(job) = &self.job else {
            return;
        };
        let mut draft = EventDraft::working(&self.stage, message).with_metrics(metrics);
        if let Some(index) = self.task_index {
            draft = draft.with_metric("task_index", serde_json::json!(index));
        }
        job.publish(draft);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("stage", &self.stage)
            .field("task_index", &self.task_index)
            .field("attached", &self.job.is_some())
            .finish()
    }
}

/// Everything a stage may read while executing.
#[derive(Debug, Clone)]
pub struct StageContext {
    job_id: Uuid,
    stage: String,
    attempt: usize,
    request: Arc<JobRequest>,
    upstream: Arc<BTreeMap<String, StageOutput>>,
    plan: Option<Arc<Plan>>,
    task: Option<TaskInput>,
    task_outputs: Arc<[StageOutput]>,
    reporter: ProgressReporter,
    cancel: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a detached context for a stage.
    #[must_use]
    pub fn new(stage: &str, request: Arc<JobRequest>) -> Self {
        Self {
            job_id: Uuid::nil(),
            stage: stage.to_string(),
            attempt: 1,
            request,
            upstream: Arc::new(BTreeMap::new()),
            plan: None,
            task: None,
            task_outputs: Arc::from(Vec::new()),
            reporter: ProgressReporter::detached(stage),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Attaches the context to a running job: events, id and cancellation.
    #[must_use]
    pub fn with_job(mut self, job: &Arc<JobHandle>) -> Self {
        self.job_id = job.id();
        self.cancel = Arc::clone(job.cancellation());
        self.reporter = ProgressReporter::attached(
            &self.stage,
            self.task.as_ref().map(|t| t.index),
            Arc::clone(job),
        );
        self
    }

    /// Sets the outputs of completed stages.
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<BTreeMap<String, StageOutput>>) -> Self {
        self.upstream = upstream;
        self
    }

    /// Sets the approved plan.
    #[must_use]
    pub fn with_plan(mut self, plan: Option<Arc<Plan>>) -> Self {
        self.plan = plan;
        self
    }

    /// Sets the fan-out task input. Call before [`StageContext::with_job`].
    #[must_use]
    pub fn with_task(mut self, task: TaskInput) -> Self {
        self.task = Some(task);
        self
    }

    /// Sets the ordered task outputs a reducer merges.
    #[must_use]
    pub fn with_task_outputs(mut self, outputs: Vec<StageOutput>) -> Self {
        self.task_outputs = Arc::from(outputs);
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: usize) -> Self {
        self.attempt = attempt;
        self
    }

    /// The job id (nil when detached).
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// The executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// The current attempt, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// The job request.
    #[must_use]
    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    /// The job topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.request.topic
    }

    /// Output of a completed upstream stage.
    #[must_use]
    pub fn upstream(&self, stage: &str) -> Option<&StageOutput> {
        self.upstream.get(stage)
    }

    /// The approved plan, once past the interrupt point.
    #[must_use]
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_deref()
    }

    /// The fan-out task input, for parallel units.
    #[must_use]
    pub fn task(&self) -> Option<&TaskInput> {
        self.task.as_ref()
    }

    /// Task outputs ordered by index, for reducers.
    #[must_use]
    pub fn task_outputs(&self) -> &[StageOutput] {
        &self.task_outputs
    }

    /// The progress reporter.
    #[must_use]
    pub fn progress(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Returns true once the job has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The job's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }
}
