//! Validated pipeline graph and its scheduling cursor.

use super::StageDescriptor;
use crate::context::GenerationOptions;
use crate::core::FanOutRole;
use std::collections::{BTreeSet, HashMap};

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Run these stages; more than one runs in parallel.
    Run(Vec<String>),
    /// Expand the producer's plan into one task per entry of the unit.
    FanOut {
        /// The parallel unit.
        unit: String,
        /// The producer whose plan drives the fan-out.
        producer: String,
    },
    /// Run the reducer over the unit's ordered outputs.
    Reduce {
        /// The reducer stage.
        reducer: String,
        /// The parallel unit it merges.
        unit: String,
    },
    /// The interrupt stage completed; wait for approval.
    AwaitApproval {
        /// The interrupt stage.
        stage: String,
    },
    /// Every enabled stage has completed.
    Complete,
    /// Nothing is ready although stages remain.
    Blocked(Vec<String>),
}

/// A validated, immutable DAG of stages.
///
/// Built with [`super::GraphBuilder`]; shared across jobs.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    stages: Vec<StageDescriptor>,
    index: HashMap<String, usize>,
    interrupt: String,
}

impl PipelineGraph {
    pub(super) fn new(stages: Vec<StageDescriptor>, interrupt: String) -> Self {
        let index = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self {
            stages,
            index,
            interrupt,
        }
    }

    /// Stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Declaration position of a stage.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// The interrupt stage.
    #[must_use]
    pub fn interrupt_stage(&self) -> &str {
        &self.interrupt
    }

    /// The producer a parallel unit depends on.
    #[must_use]
    pub fn producer_of(&self, unit: &str) -> Option<&str> {
        self.dependency_with_role(unit, FanOutRole::Producer)
    }

    /// The parallel unit a reducer merges.
    #[must_use]
    pub fn unit_of(&self, reducer: &str) -> Option<&str> {
        self.dependency_with_role(reducer, FanOutRole::ParallelUnit)
    }

    fn dependency_with_role(&self, stage: &str, role: FanOutRole) -> Option<&str> {
        self.get(stage)?
            .dependencies
            .iter()
            .find(|d| self.get(d).is_some_and(|s| s.role == role))
            .map(String::as_str)
    }

    /// Stages whose enablement predicate rejects the options.
    #[must_use]
    pub fn disabled_for(&self, options: &GenerationOptions) -> BTreeSet<String> {
        self.stages
            .iter()
            .filter(|s| !s.is_enabled(options))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Names of the stages that run for the options, in declaration order.
    pub fn enabled_for<'a>(&'a self, options: &'a GenerationOptions) -> impl Iterator<Item = &'a str> {
        self.stages
            .iter()
            .filter(move |s| s.is_enabled(options))
            .map(|s| s.name.as_str())
    }

    /// Computes the next step for a job.
    #[must_use]
    pub fn next(&self, cursor: &GraphCursor) -> NextStep {
        if cursor.completed.contains(&self.interrupt) && !cursor.approved {
            return NextStep::AwaitApproval {
                stage: self.interrupt.clone(),
            };
        }

        let ready: Vec<&StageDescriptor> = self
            .stages
            .iter()
            .filter(|s| !cursor.is_settled(&s.name))
            .filter(|s| s.dependencies.iter().all(|d| cursor.is_settled(d)))
            .collect();

        let Some(first) = ready.first() else {
            let remaining: Vec<String> = self
                .stages
                .iter()
                .filter(|s| !cursor.is_settled(&s.name))
                .map(|s| s.name.clone())
                .collect();
            return if remaining.is_empty() {
                NextStep::Complete
            } else {
                NextStep::Blocked(remaining)
            };
        };

        match first.role {
            FanOutRole::ParallelUnit => NextStep::FanOut {
                unit: first.name.clone(),
                producer: self.producer_of(&first.name).unwrap_or_default().to_string(),
            },
            FanOutRole::Reducer => NextStep::Reduce {
                reducer: first.name.clone(),
                unit: self.unit_of(&first.name).unwrap_or_default().to_string(),
            },
            FanOutRole::None | FanOutRole::Producer => NextStep::Run(
                ready
                    .iter()
                    .filter(|s| matches!(s.role, FanOutRole::None | FanOutRole::Producer))
                    .map(|s| s.name.clone())
                    .collect(),
            ),
        }
    }
}

/// Per-job scheduling state over a [`PipelineGraph`].
#[derive(Debug, Clone, Default)]
pub struct GraphCursor {
    completed: BTreeSet<String>,
    disabled: BTreeSet<String>,
    approved: bool,
}

impl GraphCursor {
    /// Creates a cursor; disabled stages count as settled from the start.
    #[must_use]
    pub fn new(disabled: BTreeSet<String>) -> Self {
        Self {
            completed: BTreeSet::new(),
            disabled,
            approved: false,
        }
    }

    /// Marks a stage completed (or skipped).
    pub fn complete(&mut self, stage: &str) {
        self.completed.insert(stage.to_string());
    }

    /// Records approval at the interrupt point.
    pub fn approve(&mut self) {
        self.approved = true;
    }

    /// Returns true if the stage completed or is disabled.
    #[must_use]
    pub fn is_settled(&self, stage: &str) -> bool {
        self.completed.contains(stage) || self.disabled.contains(stage)
    }
}
