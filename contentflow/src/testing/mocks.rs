//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::StageError;
use crate::stages::Stage;

/// A scripted stage that records calls and returns a configurable output.
///
/// Fan-out tasks echo their index in the `index` field so reducers and tests
/// can check ordering.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<StageOutput>,
    delay: Duration,
    transient_failures: usize,
    failing_tasks: BTreeSet<usize>,
    fatal: Option<StageError>,
    calls: Mutex<Vec<(Option<usize>, usize)>>,
}

impl MockStage {
    /// Creates a mock stage that succeeds with an empty output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(StageOutput::ok_empty()),
            delay: Duration::ZERO,
            transient_failures: 0,
            failing_tasks: BTreeSet::new(),
            fatal: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the output to return.
    #[must_use]
    pub fn with_output(self, output: StageOutput) -> Self {
        *self.output.lock() = output;
        self
    }

    /// Sleeps before every attempt.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `count` attempts of each call site with a transient error.
    #[must_use]
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Always fails with this error.
    #[must_use]
    pub fn failing(mut self, error: StageError) -> Self {
        self.fatal = Some(error);
        self
    }

    /// Fails fatally for the given fan-out task.
    #[must_use]
    pub fn failing_on_task(mut self, index: usize) -> Self {
        self.failing_tasks.insert(index);
        self
    }

    /// Sets the output to return.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of attempts made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Task indices of the attempts, in call order.
    #[must_use]
    pub fn recorded_tasks(&self) -> Vec<Option<usize>> {
        self.calls.lock().iter().map(|(task, _)| *task).collect()
    }

    /// Attempt numbers, in call order.
    #[must_use]
    pub fn recorded_attempts(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|(_, attempt)| *attempt).collect()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let task = ctx.task().map(|t| t.index);
        self.calls.lock().push((task, ctx.attempt()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = &self.fatal {
            return Err(error.clone());
        }
        if task.is_some_and(|i| self.failing_tasks.contains(&i)) {
            return Err(StageError::fatal(format!("task {} failed", task.unwrap_or_default())));
        }
        if ctx.attempt() <= self.transient_failures {
            return Err(StageError::transient(format!("attempt {} timed out", ctx.attempt())));
        }

        let output = self.output.lock().clone();
        Ok(match task {
            Some(index) => output.with_value("index", json!(index)),
            None => output,
        })
    }
}

/// A producer that emits a plan with a fixed number of tasks.
#[derive(Debug)]
pub struct PlanStage {
    name: String,
    tasks: usize,
}

impl PlanStage {
    /// Creates a producer planning `tasks` tasks.
    #[must_use]
    pub fn new(name: impl Into<String>, tasks: usize) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    /// The plan value this stage emits.
    #[must_use]
    pub fn plan(&self) -> serde_json::Value {
        let tasks: Vec<_> = (0..self.tasks)
            .map(|i| json!({ "title": format!("Task {i}") }))
            .collect();
        json!({ "title": "Test plan", "tasks": tasks })
    }
}

#[async_trait]
impl Stage for PlanStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        Ok(StageOutput::ok_value("plan", self.plan()))
    }
}

/// A parallel unit whose tasks finish in reverse index order.
///
/// Task `i` of `n` sleeps `(n - i) * step` and echoes its index and title.
#[derive(Debug)]
pub struct ReverseStage {
    name: String,
    step: Duration,
    completed: Mutex<Vec<usize>>,
}

impl ReverseStage {
    /// Creates a reverse-completing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, step: Duration) -> Self {
        Self {
            name: name.into(),
            step,
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Task indices in completion order.
    #[must_use]
    pub fn completion_order(&self) -> Vec<usize> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl Stage for ReverseStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let task = ctx
            .task()
            .ok_or_else(|| StageError::fatal("reverse stage requires a task"))?;
        let remaining = u32::try_from(task.total - task.index).unwrap_or(u32::MAX);
        tokio::time::sleep(self.step * remaining).await;
        self.completed.lock().push(task.index);

        let title = task.input.get("title").cloned().unwrap_or_default();
        Ok(StageOutput::ok_value("index", json!(task.index)).with_value("title", title))
    }
}

/// A reducer that lists the `index` of each task output, in the order given.
#[derive(Debug)]
pub struct CollectStage {
    name: String,
}

impl CollectStage {
    /// Creates a collecting reducer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for CollectStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let order: Vec<_> = ctx
            .task_outputs()
            .iter()
            .map(|o| o.get("index").cloned().unwrap_or_default())
            .collect();
        Ok(StageOutput::ok_value("order", json!(order)))
    }
}
