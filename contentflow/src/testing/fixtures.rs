//! Test fixtures: a small fan-out graph and an engine harness.

use std::sync::Arc;
use std::time::Duration;

use super::{CollectStage, MockStage, PlanStage};
use crate::core::{FanOutRole, JobStatus};
use crate::events::{CollectingEventSink, EventBus, DEFAULT_CHANNEL_CAPACITY};
use crate::gateway::ProgressGateway;
use crate::jobs::{JobId, JobRegistry, JobSnapshot};
use crate::pipeline::{
    GraphBuilder, JitterStrategy, Orchestrator, PipelineGraph, RetryConfig, StageDescriptor,
};
use crate::stages::Stage;

/// A five-stage fan-out graph:
/// `research -> plan* => write[] => merge -> publish`.
///
/// Each stage is swappable before [`TestGraph::build`].
#[derive(Debug, Clone)]
pub struct TestGraph {
    /// First stage.
    pub research: Arc<dyn Stage>,
    /// Producer and interrupt point.
    pub plan: Arc<dyn Stage>,
    /// Parallel unit.
    pub write: Arc<dyn Stage>,
    /// Reducer.
    pub merge: Arc<dyn Stage>,
    /// Final stage.
    pub publish: Arc<dyn Stage>,
}

impl TestGraph {
    /// Default stages; the plan has `tasks` tasks.
    #[must_use]
    pub fn new(tasks: usize) -> Self {
        Self {
            research: Arc::new(MockStage::new("research")),
            plan: Arc::new(PlanStage::new("plan", tasks)),
            write: Arc::new(MockStage::new("write")),
            merge: Arc::new(CollectStage::new("merge")),
            publish: Arc::new(MockStage::new("publish")),
        }
    }

    /// Builds the graph.
    ///
    /// # Panics
    ///
    /// Never for the fixed shape.
    #[must_use]
    pub fn build(self) -> PipelineGraph {
        GraphBuilder::new()
            .stage(StageDescriptor::new("research", self.research))
            .stage(
                StageDescriptor::new("plan", self.plan)
                    .with_dependency("research")
                    .with_role(FanOutRole::Producer)
                    .interrupt(),
            )
            .stage(
                StageDescriptor::new("write", self.write)
                    .with_dependency("plan")
                    .with_role(FanOutRole::ParallelUnit),
            )
            .stage(
                StageDescriptor::new("merge", self.merge)
                    .with_dependency("write")
                    .with_role(FanOutRole::Reducer),
            )
            .stage(StageDescriptor::new("publish", self.publish).with_dependency("merge"))
            .build()
            .unwrap_or_else(|e| panic!("test graph is valid: {e}"))
    }
}

/// Retry policy with millisecond delays and no jitter.
#[must_use]
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(3)
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
        .with_jitter(JitterStrategy::None)
}

/// An orchestrator, registry and gateway wired together.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// The orchestrator.
    pub orchestrator: Orchestrator,
    /// The shared registry.
    pub registry: Arc<JobRegistry>,
    /// The gateway over the registry.
    pub gateway: ProgressGateway,
    /// Every published event, across jobs.
    pub sink: Arc<CollectingEventSink>,
}

impl TestHarness {
    /// Wires an engine over a graph with [`fast_retry`].
    #[must_use]
    pub fn new(graph: PipelineGraph) -> Self {
        let sink = Arc::new(CollectingEventSink::new());
        let bus = EventBus::new(DEFAULT_CHANNEL_CAPACITY).with_sink(Arc::clone(&sink) as _);
        let registry = Arc::new(JobRegistry::new(Arc::new(bus)));
        Self {
            orchestrator: Orchestrator::new(graph, Arc::clone(&registry)).with_retry(fast_retry()),
            gateway: ProgressGateway::new(Arc::clone(&registry)),
            registry,
            sink,
        }
    }

    /// Polls until the job reaches a status matching the predicate.
    ///
    /// # Panics
    ///
    /// If the job is unknown or the status is not reached within five seconds.
    pub async fn wait_for(&self, job_id: JobId, reached: impl Fn(JobStatus) -> bool) -> JobSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self
                .registry
                .get(job_id)
                .unwrap_or_else(|e| panic!("job lookup failed: {e}"));
            if reached(job.status()) {
                return job.snapshot();
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} stuck in status {}",
                job.status()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Polls until the job is terminal.
    pub async fn wait_terminal(&self, job_id: JobId) -> JobSnapshot {
        self.wait_for(job_id, |status| status.is_terminal()).await
    }
}
