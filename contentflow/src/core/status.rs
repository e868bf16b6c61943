//! Job status, event status and fan-out role enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job has been created but the orchestrator has not picked it up.
    Pending,
    /// Stages are executing.
    Running,
    /// Paused at the interrupt point, waiting for a resume decision.
    AwaitingApproval,
    /// All stages finished and the bundle is assembled.
    Completed,
    /// A stage or barrier failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::AwaitingApproval => write!(f, "awaiting_approval"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::AwaitingApproval | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::AwaitingApproval => matches!(next, Self::Running | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// The status tag carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// A stage (or the job) started.
    Started,
    /// Intermediate progress: a retry, a fan-out task, or the approval pause.
    Working,
    /// A stage (or the job) completed.
    Completed,
    /// A stage (or the job) failed.
    Error,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Working => write!(f, "working"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A stage's role in the fan-out/merge pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutRole {
    /// An ordinary sequential stage.
    None,
    /// Produces the plan that determines fan-out width.
    Producer,
    /// Runs once per planned task.
    ParallelUnit,
    /// Merges the ordered outputs of a parallel unit.
    Reducer,
}

impl Default for FanOutRole {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for FanOutRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Producer => write!(f, "producer"),
            Self::ParallelUnit => write!(f, "parallel_unit"),
            Self::Reducer => write!(f, "reducer"),
        }
    }
}
