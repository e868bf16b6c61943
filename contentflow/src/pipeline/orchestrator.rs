//! Job orchestration over a pipeline graph.
//!
//! One orchestrator task drives each job: it walks the graph with a
//! [`GraphCursor`], runs ready stages (in parallel when independent), expands
//! the producer's plan into a fan-out behind a full barrier, pauses at the
//! interrupt point, and finalizes the job exactly once.

use super::{GraphCursor, NextStep, PipelineGraph, RetryConfig, RetryState, StageDescriptor};
use crate::context::{JobRequest, Plan, StageContext, TaskInput};
use crate::core::{
    ArtifactBundle, EventDraft, EventStatus, FanOutRole, StageOutput, StageRecord, PIPELINE_STAGE,
};
use crate::errors::{BarrierFailure, PipelineError, StageError, SubmitError, TaskFailure};
use crate::jobs::{JobHandle, JobId, JobOutcome, JobRegistry};
use crate::stages::Stage;
use crate::utils::validate_topic;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a job stopped before completing.
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed(PipelineError),
}

impl From<PipelineError> for Halt {
    fn from(err: PipelineError) -> Self {
        Self::Failed(err)
    }
}

/// Why a stage or task produced no output.
#[derive(Debug)]
enum AttemptError {
    Cancelled,
    Failed { attempts: usize, error: StageError },
}

/// Submits jobs and drives them through the graph.
///
/// Cheap to clone; every job runs on its own spawned task.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    graph: Arc<PipelineGraph>,
    registry: Arc<JobRegistry>,
    retry: RetryConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over a validated graph and a registry.
    #[must_use]
    pub fn new(graph: PipelineGraph, registry: Arc<JobRegistry>) -> Self {
        Self {
            graph: Arc::new(graph),
            registry,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry policy for stages and tasks.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The graph jobs run over.
    #[must_use]
    pub fn graph(&self) -> &Arc<PipelineGraph> {
        &self.graph
    }

    /// The job registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validates the request, registers a job and starts it.
    ///
    /// Returns as soon as the job is registered. Must be called from within a
    /// Tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, SubmitError> {
        let topic = validate_topic(&request.topic)?;
        let job = self.registry.create(JobRequest { topic, ..request });
        job.publish(
            EventDraft::new(PIPELINE_STAGE, EventStatus::Started, "Job submitted")
                .with_metric("topic", json!(job.request().topic)),
        );
        info!(job_id = %job.id(), topic = %job.request().topic, "Job submitted");

        let orchestrator = self.clone();
        let handle = Arc::clone(&job);
        tokio::spawn(async move { orchestrator.run(handle).await });
        Ok(job.id())
    }

    /// Drives a job to a terminal state.
    pub async fn run(&self, job: Arc<JobHandle>) {
        let outcome = match self.drive(&job).await {
            Ok(bundle) => JobOutcome::Completed(bundle),
            Err(Halt::Failed(err)) if !job.cancellation().is_cancelled() => {
                error!(job_id = %job.id(), kind = err.kind(), error = %err, "Job failed");
                JobOutcome::Failed(err)
            }
            Err(_) => {
                let reason = job
                    .cancellation()
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string());
                info!(job_id = %job.id(), %reason, "Job cancelled");
                JobOutcome::Cancelled(reason)
            }
        };
        job.finalize(outcome);
    }

    async fn drive(&self, job: &Arc<JobHandle>) -> Result<ArtifactBundle, Halt> {
        checkpoint(job)?;
        if !job.mark_running() {
            return Err(Halt::Cancelled);
        }
        let options = job.request().options.clone();
        job.init_progress(self.graph.enabled_for(&options));
        info!(job_id = %job.id(), "Job running");

        let mut cursor = GraphCursor::new(self.graph.disabled_for(&options));
        let mut outputs: BTreeMap<String, StageOutput> = BTreeMap::new();
        let mut task_outputs: BTreeMap<String, Vec<StageOutput>> = BTreeMap::new();
        let mut plan: Option<Arc<Plan>> = None;

        loop {
            checkpoint(job)?;
            let step = self.graph.next(&cursor);
            debug!(job_id = %job.id(), ?step, "Next step");

            match step {
                NextStep::Run(stages) => {
                    let upstream = Arc::new(outputs.clone());
                    let results = self.run_batch(job, &stages, &upstream, plan.as_ref()).await?;
                    for (name, output) in results {
                        if self.graph.get(&name).is_some_and(|s| s.role == FanOutRole::Producer) {
                            let produced = parse_plan(&name, &output)?;
                            job.set_plan(produced.clone());
                            plan = Some(Arc::new(produced));
                        }
                        cursor.complete(&name);
                        outputs.insert(name, output);
                    }
                }
                NextStep::AwaitApproval { stage } => {
                    self.await_approval(job, &stage).await?;
                    plan = job.plan().map(Arc::new);
                    cursor.approve();
                }
                NextStep::FanOut { unit, producer } => {
                    let plan = plan.clone().ok_or_else(|| {
                        PipelineError::InvalidPlan(format!(
                            "producer '{producer}' left no plan for '{unit}'"
                        ))
                    })?;
                    let upstream = Arc::new(outputs.clone());
                    let results = self.fan_out(job, &unit, &plan, &upstream).await?;
                    task_outputs.insert(unit.clone(), results);
                    cursor.complete(&unit);
                }
                NextStep::Reduce { reducer, unit } => {
                    let descriptor = self.descriptor(&reducer)?;
                    let ctx = StageContext::new(&reducer, Arc::clone(job.request()))
                        .with_upstream(Arc::new(outputs.clone()))
                        .with_plan(plan.clone())
                        .with_task_outputs(task_outputs.remove(&unit).unwrap_or_default())
                        .with_job(job);
                    let output = self.run_stage(job, descriptor, ctx).await?;
                    cursor.complete(&reducer);
                    outputs.insert(reducer, output);
                }
                NextStep::Complete => return Ok(self.assemble(job)),
                NextStep::Blocked(remaining) => {
                    return Err(PipelineError::Internal(format!(
                        "no stage is ready; remaining: {}",
                        remaining.join(", ")
                    ))
                    .into());
                }
            }
        }
    }

    fn descriptor(&self, name: &str) -> Result<&StageDescriptor, Halt> {
        self.graph
            .get(name)
            .ok_or_else(|| PipelineError::Internal(format!("unknown stage '{name}'")).into())
    }

    async fn run_batch(
        &self,
        job: &Arc<JobHandle>,
        stages: &[String],
        upstream: &Arc<BTreeMap<String, StageOutput>>,
        plan: Option<&Arc<Plan>>,
    ) -> Result<Vec<(String, StageOutput)>, Halt> {
        let context = |name: &str| {
            StageContext::new(name, Arc::clone(job.request()))
                .with_upstream(Arc::clone(upstream))
                .with_plan(plan.cloned())
                .with_job(job)
        };

        if let [name] = stages {
            let output = self.run_stage(job, self.descriptor(name)?, context(name)).await?;
            return Ok(vec![(name.clone(), output)]);
        }

        let mut handles = FuturesUnordered::new();
        for name in stages {
            let descriptor = self.descriptor(name)?.clone();
            let ctx = context(name);
            let orchestrator = self.clone();
            let job = Arc::clone(job);
            handles.push(tokio::spawn(async move {
                let result = orchestrator.run_stage(&job, &descriptor, ctx).await;
                (descriptor.name, result)
            }));
        }

        let mut settled = BTreeMap::new();
        while let Some(joined) = handles.next().await {
            let (name, result) = joined
                .map_err(|e| PipelineError::Internal(format!("stage task panicked: {e}")))?;
            settled.insert(name, result);
        }

        let mut outputs = Vec::with_capacity(stages.len());
        let mut failure = None;
        for name in stages {
            match settled.remove(name) {
                Some(Ok(output)) => outputs.push((name.clone(), output)),
                Some(Err(Halt::Cancelled)) => return Err(Halt::Cancelled),
                Some(Err(halt)) => {
                    failure.get_or_insert(halt);
                }
                None => {
                    failure.get_or_insert(Halt::Failed(PipelineError::Internal(format!(
                        "stage '{name}' produced no result"
                    ))));
                }
            }
        }
        match failure {
            Some(halt) => Err(halt),
            None => Ok(outputs),
        }
    }

    /// Runs one stage with retries and settles its outcome.
    async fn run_stage(
        &self,
        job: &Arc<JobHandle>,
        descriptor: &StageDescriptor,
        ctx: StageContext,
    ) -> Result<StageOutput, Halt> {
        let name = descriptor.name.as_str();
        checkpoint(job)?;
        job.publish(EventDraft::started(name));

        match self.attempt(job, &descriptor.runner, &ctx).await {
            Ok((output, attempts)) => {
                if let Some(reason) = output.skip_reason() {
                    if !descriptor.optional {
                        let message = format!("required stage declined: {reason}");
                        job.publish(EventDraft::error(name, message.clone()));
                        return Err(PipelineError::ContractViolation {
                            stage: name.to_string(),
                            message,
                        }
                        .into());
                    }
                    let reason = reason.to_string();
                    return Ok(Self::skip(job, name, attempts, reason));
                }

                let metrics = output.metrics.clone();
                job.record(StageRecord::new(name, None, attempts, output.clone()));
                job.publish(
                    EventDraft::completed(name)
                        .with_metrics(metrics)
                        .with_metric("attempts", json!(attempts)),
                );
                Ok(output)
            }
            Err(AttemptError::Cancelled) => Err(Halt::Cancelled),
            Err(AttemptError::Failed { attempts, error }) if descriptor.optional => {
                warn!(job_id = %job.id(), stage = name, attempts, %error, "Optional stage failed; skipping");
                Ok(Self::skip(job, name, attempts, format!("failed: {error}")))
            }
            Err(AttemptError::Failed { attempts, error }) => {
                job.publish(
                    EventDraft::error(name, error.to_string())
                        .with_metric("attempts", json!(attempts))
                        .with_metric("transient", json!(error.is_transient())),
                );
                Err(PipelineError::Stage {
                    stage: name.to_string(),
                    attempts,
                    source: error,
                }
                .into())
            }
        }
    }

    fn skip(job: &JobHandle, stage: &str, attempts: usize, reason: String) -> StageOutput {
        info!(job_id = %job.id(), stage, %reason, "Stage skipped");
        let output = StageOutput::skip(reason.clone());
        job.record(StageRecord::new(stage, None, attempts, output.clone()));
        job.publish(
            EventDraft::new(stage, EventStatus::Completed, format!("{stage} skipped: {reason}"))
                .with_metric("skipped", json!(true))
                .with_metric("reason", json!(reason)),
        );
        output
    }

    /// Executes a stage until it succeeds, fails fatally, exhausts its
    /// attempts or the job is cancelled.
    async fn attempt(
        &self,
        job: &JobHandle,
        runner: &Arc<dyn Stage>,
        ctx: &StageContext,
    ) -> Result<(StageOutput, usize), AttemptError> {
        let stage = ctx.stage_name();
        let task_index = ctx.task().map(|t| t.index);
        let cancel = job.cancellation();
        let mut retry = RetryState::new();

        loop {
            if cancel.is_cancelled() {
                return Err(AttemptError::Cancelled);
            }
            let attempt = retry.attempt();
            let result = runner.execute(&ctx.clone().with_attempt(attempt)).await;
            if cancel.is_cancelled() {
                debug!(job_id = %job.id(), stage, "Discarding result of cancelled job");
                return Err(AttemptError::Cancelled);
            }

            let error = match result {
                Ok(output) => return Ok((output, attempt)),
                Err(error) => error,
            };
            if !error.is_transient() {
                return Err(AttemptError::Failed {
                    attempts: attempt,
                    error,
                });
            }
            let Some(delay) = retry.record_failure(&self.retry) else {
                return Err(AttemptError::Failed {
                    attempts: attempt,
                    error,
                });
            };

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(job_id = %job.id(), stage, ?task_index, attempt, delay_ms, %error, "Transient failure; retrying");
            let mut draft = EventDraft::working(stage, format!("Attempt {attempt} failed: {error}; retrying"))
                .with_metric("attempt", json!(attempt))
                .with_metric("delay_ms", json!(delay_ms));
            if let Some(index) = task_index {
                draft = draft.with_metric("task_index", json!(index));
            }
            job.publish(draft);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AttemptError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn await_approval(&self, job: &Arc<JobHandle>, stage: &str) -> Result<(), Halt> {
        let plan = job.plan().ok_or_else(|| {
            PipelineError::Internal(format!("no plan persisted at interrupt stage '{stage}'"))
        })?;

        if job.request().options.auto_approve {
            job.publish(
                EventDraft::working(PIPELINE_STAGE, "Plan auto-approved")
                    .with_metric("tasks", json!(plan.task_count())),
            );
            return Ok(());
        }

        let Some(resume) = job.await_approval(stage, plan) else {
            return Err(Halt::Cancelled);
        };
        tokio::select! {
            decision = resume => match decision {
                Ok(decision) => {
                    debug!(job_id = %job.id(), ?decision, "Resume received");
                    Ok(())
                }
                Err(_) => Err(Halt::Cancelled),
            },
            () = job.cancellation().cancelled() => Err(Halt::Cancelled),
        }
    }

    async fn fan_out(
        &self,
        job: &Arc<JobHandle>,
        unit: &str,
        plan: &Arc<Plan>,
        upstream: &Arc<BTreeMap<String, StageOutput>>,
    ) -> Result<Vec<StageOutput>, Halt> {
        let descriptor = self.descriptor(unit)?;
        let total = plan.task_count();
        checkpoint(job)?;
        job.publish(EventDraft::started(unit).with_metric("tasks", json!(total)));
        info!(job_id = %job.id(), stage = unit, tasks = total, "Fanning out");

        let mut handles = FuturesUnordered::new();
        for (index, input) in plan.tasks().iter().cloned().enumerate() {
            let ctx = StageContext::new(unit, Arc::clone(job.request()))
                .with_upstream(Arc::clone(upstream))
                .with_plan(Some(Arc::clone(plan)))
                .with_task(TaskInput {
                    index,
                    total,
                    input,
                })
                .with_job(job);
            let runner = Arc::clone(&descriptor.runner);
            let orchestrator = self.clone();
            let job = Arc::clone(job);
            handles.push(tokio::spawn(async move {
                let result = orchestrator.attempt(&job, &runner, &ctx).await;
                if result.is_ok() {
                    job.publish(
                        EventDraft::working(
                            ctx.stage_name(),
                            format!("Task {} of {total} completed", index + 1),
                        )
                        .with_metric("task_index", json!(index)),
                    );
                }
                (index, result)
            }));
        }

        let mut settled = Vec::with_capacity(total);
        while let Some(joined) = handles.next().await {
            settled.push(
                joined.map_err(|e| PipelineError::Internal(format!("task panicked: {e}")))?,
            );
        }
        settled.sort_by_key(|(index, _)| *index);
        checkpoint(job)?;

        let mut completed = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, result) in settled {
            match result {
                Ok((output, attempts)) => completed.push((index, attempts, output)),
                Err(AttemptError::Cancelled) => return Err(Halt::Cancelled),
                Err(AttemptError::Failed { attempts, error }) => failures.push(TaskFailure {
                    index,
                    attempts,
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            let failure = BarrierFailure {
                stage: unit.to_string(),
                total,
                failures,
            };
            job.publish(
                EventDraft::error(unit, failure.to_string())
                    .with_metric("failed_tasks", json!(failure.failures.len()))
                    .with_metric("tasks", json!(total)),
            );
            return Err(PipelineError::Barrier(failure).into());
        }

        let mut outputs = Vec::with_capacity(total);
        for (index, attempts, output) in completed {
            job.record(StageRecord::new(unit, Some(index), attempts, output.clone()));
            outputs.push(output);
        }
        job.publish(EventDraft::completed(unit).with_metric("tasks", json!(total)));
        Ok(outputs)
    }

    fn assemble(&self, job: &JobHandle) -> ArtifactBundle {
        let mut records = job.records();
        records.sort_by_key(|r| (self.graph.position(&r.stage).unwrap_or(usize::MAX), r.task_index));
        let bundle = ArtifactBundle::assemble(job.id(), &job.request().topic, &records);
        info!(
            job_id = %job.id(),
            artifacts = bundle.artifacts.len(),
            digest = %bundle.digest,
            "Bundle assembled"
        );
        bundle
    }
}

fn checkpoint(job: &JobHandle) -> Result<(), Halt> {
    if job.cancellation().is_cancelled() {
        Err(Halt::Cancelled)
    } else {
        Ok(())
    }
}

fn parse_plan(stage: &str, output: &StageOutput) -> Result<Plan, PipelineError> {
    let value = output
        .get("plan")
        .cloned()
        .ok_or_else(|| PipelineError::InvalidPlan(format!("producer '{stage}' returned no plan")))?;
    Ok(Plan::from_value(value)?)
}
