//! Process-lifetime mapping from job id to job.

use super::{JobHandle, JobId, ResumeDecision};
use crate::context::JobRequest;
use crate::errors::RegistryError;
use crate::events::EventBus;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// In-memory job registry.
///
/// Constructed explicitly and shared by the orchestrator, the gateway and the
/// server state. Terminal jobs are retained until deleted or process exit.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobHandle>>,
    bus: Arc<EventBus>,
}

impl JobRegistry {
    /// Creates an empty registry publishing on the given bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            jobs: DashMap::new(),
            bus,
        }
    }

    /// The event bus jobs publish on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Creates and registers a pending job.
    pub fn create(&self, request: JobRequest) -> Arc<JobHandle> {
        let job = Arc::new(JobHandle::new(request, Arc::clone(&self.bus)));
        self.jobs.insert(job.id(), Arc::clone(&job));
        job
    }

    /// Looks up a job.
    pub fn get(&self, job_id: JobId) -> Result<Arc<JobHandle>, RegistryError> {
        self.jobs
            .get(&job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RegistryError::NotFound { job_id })
    }

    /// Resumes a job awaiting approval.
    pub fn resume(&self, job_id: JobId, decision: ResumeDecision) -> Result<(), RegistryError> {
        self.get(job_id)?.resume(decision)
    }

    /// Cancels a non-terminal job.
    pub fn cancel(&self, job_id: JobId) -> Result<(), RegistryError> {
        let job = self.get(job_id)?;
        job.cancel("cancelled by request")?;
        info!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    /// Removes a terminal job.
    pub fn delete(&self, job_id: JobId) -> Result<(), RegistryError> {
        let status = self.get(job_id)?.status();
        if !status.is_terminal() {
            return Err(RegistryError::NotTerminal { job_id, status });
        }
        self.jobs.remove(&job_id);
        self.bus.close(job_id);
        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Number of jobs that have not reached a terminal status.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.value().status().is_terminal())
            .count()
    }

    /// Total number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::default()))
    }
}
