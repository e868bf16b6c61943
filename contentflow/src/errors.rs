//! Error types for the contentflow engine.
//!
//! The taxonomy separates build-time graph errors, per-stage runtime errors,
//! fan-out barrier failures and the control-plane errors returned by the
//! registry and submission API.

use crate::core::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info, attaching the default fix hint for
    /// the code when one is known.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        let code = code.into();
        let fix_hint = ContractSuggestions::get(&code).map(str::to_string);
        Self {
            code,
            summary: summary.into(),
            fix_hint,
            context: HashMap::new(),
        }
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the pipeline graph violates a structural invariant.
///
/// Detected once, when the graph is built; no job can start against a
/// malformed graph.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphConfigurationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl GraphConfigurationError {
    fn new(
        message: impl Into<String>,
        stages: Vec<String>,
        code: &str,
    ) -> Self {
        let message = message.into();
        let mut error_info = ContractErrorInfo::new(code, message.clone());
        if !stages.is_empty() {
            error_info = error_info.with_context_entry("stages", stages.join(","));
        }
        Self {
            error_info,
            message,
            stages,
        }
    }

    /// Returns the contract error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }

    /// The graph has no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self::new("Pipeline graph has no stages", Vec::new(), "GRAPH-EMPTY")
    }

    /// Two stages share a name.
    #[must_use]
    pub fn duplicate(stage: &str) -> Self {
        Self::new(
            format!("Stage '{stage}' is declared more than once"),
            vec![stage.to_string()],
            "GRAPH-DUPLICATE",
        )
    }

    /// A stage depends on a stage that is not in the graph.
    #[must_use]
    pub fn missing_dependency(stage: &str, dependency: &str) -> Self {
        Self::new(
            format!("Stage '{stage}' depends on unknown stage '{dependency}'"),
            vec![stage.to_string(), dependency.to_string()],
            "GRAPH-MISSING-DEP",
        )
    }

    /// The dependency edges form a cycle.
    #[must_use]
    pub fn cycle(cycle_path: Vec<String>) -> Self {
        Self::new(
            format!("Cycle detected in pipeline: {}", cycle_path.join(" -> ")),
            cycle_path,
            "GRAPH-CYCLE",
        )
    }

    /// The interrupt point is missing, duplicated or misplaced.
    #[must_use]
    pub fn interrupt(message: impl Into<String>, stages: Vec<String>) -> Self {
        Self::new(message, stages, "GRAPH-INTERRUPT")
    }

    /// A parallel unit is not wired to exactly one producer and one reducer.
    #[must_use]
    pub fn fan_out(message: impl Into<String>, stages: Vec<String>) -> Self {
        Self::new(message, stages, "GRAPH-REDUCER")
    }
}

/// Whether a stage error is eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Transient failure; the orchestrator retries with backoff.
    Transient,
    /// Fatal failure; the job aborts immediately.
    Fatal,
}

/// Error returned by a stage's `execute`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct StageError {
    /// Retry classification.
    pub kind: StageErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl StageError {
    /// Creates a transient (retryable) stage error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StageErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a fatal stage error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: StageErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Returns true if the error may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == StageErrorKind::Transient
    }
}

/// One fan-out task that failed after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Task index within the fan-out group.
    pub index: usize,
    /// Attempts made before giving up.
    pub attempts: usize,
    /// The final error.
    pub error: StageError,
}

/// One or more fan-out tasks failed; the group as a whole failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "Fan-out '{stage}' failed: {} of {total} tasks failed ({})",
    failures.len(),
    describe_failures(failures)
)]
pub struct BarrierFailure {
    /// The parallel-unit stage.
    pub stage: String,
    /// Number of tasks in the group.
    pub total: usize,
    /// Failed tasks, ordered by index.
    pub failures: Vec<TaskFailure>,
}

fn describe_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("task {}: {}", f.index, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The error that moves a job to `Failed`.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// A stage failed fatally or exhausted its retries.
    #[error("Stage '{stage}' failed after {attempts} attempt(s): {source}")]
    Stage {
        /// Stage name.
        stage: String,
        /// Attempts made.
        attempts: usize,
        /// The final stage error.
        source: StageError,
    },

    /// A fan-out group failed.
    #[error("{0}")]
    Barrier(#[from] BarrierFailure),

    /// The plan could not drive a fan-out.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// A stage returned an outcome its descriptor does not allow.
    #[error("Stage '{stage}' violated its contract: {message}")]
    ContractViolation {
        /// Stage name.
        stage: String,
        /// What went wrong.
        message: String,
    },

    /// The orchestrator reached an inconsistent state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short machine-readable tag for the error detail.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage_error",
            Self::Barrier(_) => "barrier_failure",
            Self::InvalidPlan(_) => "invalid_plan",
            Self::ContractViolation { .. } => "contract_violation",
            Self::Internal(_) => "internal",
        }
    }

    /// The stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } | Self::ContractViolation { stage, .. } => Some(stage),
            Self::Barrier(b) => Some(&b.stage),
            Self::InvalidPlan(_) | Self::Internal(_) => None,
        }
    }
}

/// A plan that cannot drive a fan-out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PlanError(pub String);

impl From<PlanError> for PipelineError {
    fn from(err: PlanError) -> Self {
        Self::InvalidPlan(err.0)
    }
}

impl From<PlanError> for RegistryError {
    fn from(err: PlanError) -> Self {
        Self::InvalidPlan(err.0)
    }
}

/// Errors returned by control operations on the job registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No job with this id.
    #[error("Job not found: {job_id}")]
    NotFound {
        /// The job id.
        job_id: Uuid,
    },

    /// Resume was called outside `AwaitingApproval`.
    #[error("Job {job_id} is not awaiting approval (status: {status})")]
    NotAwaitingApproval {
        /// The job id.
        job_id: Uuid,
        /// The job's current status.
        status: JobStatus,
    },

    /// The job already reached a terminal state.
    #[error("Job {job_id} is already {status}")]
    AlreadyTerminal {
        /// The job id.
        job_id: Uuid,
        /// The terminal status.
        status: JobStatus,
    },

    /// The operation requires a terminal job.
    #[error("Job {job_id} is still {status}")]
    NotTerminal {
        /// The job id.
        job_id: Uuid,
        /// The job's current status.
        status: JobStatus,
    },

    /// An edited plan was rejected.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}

/// Errors returned when a submission is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The topic failed validation.
    #[error("Topic validation failed: {0}")]
    InvalidTopic(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Provides default suggestions for graph contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "GRAPH-CYCLE" => Some(
                "Check your stage dependencies for circular references. \
                 Use a linear chain or fan-out pattern instead.",
            ),
            "GRAPH-MISSING-DEP" => Some(
                "Ensure all dependencies reference stages that exist in the graph. \
                 Check for typos in stage names.",
            ),
            "GRAPH-DUPLICATE" => Some("Give every stage a unique name."),
            "GRAPH-EMPTY" => Some("Add at least one stage to the graph before building."),
            "GRAPH-INTERRUPT" => Some(
                "Mark exactly one stage as the interrupt point: the planning stage, \
                 upstream of every parallel unit.",
            ),
            "GRAPH-REDUCER" => Some(
                "Each parallel unit needs exactly one producer dependency and exactly \
                 one reducer consuming it.",
            ),
            _ => None,
        }
    }
}
