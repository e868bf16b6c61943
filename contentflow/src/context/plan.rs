//! The plan persisted at the interrupt point.

use crate::errors::PlanError;
use serde::{Deserialize, Serialize};

/// A content plan: a JSON object whose `tasks` array drives the fan-out.
///
/// A `Plan` always holds a non-empty `tasks` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Plan {
    value: serde_json::Value,
}

impl Plan {
    /// Validates a JSON value as a plan.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PlanError> {
        let tasks = value
            .get("tasks")
            .ok_or_else(|| PlanError("plan has no 'tasks' field".to_string()))?
            .as_array()
            .ok_or_else(|| PlanError("plan 'tasks' must be an array".to_string()))?;
        if tasks.is_empty() {
            return Err(PlanError("plan 'tasks' must not be empty".to_string()));
        }
        Ok(Self { value })
    }

    /// The planned tasks, in index order.
    #[must_use]
    pub fn tasks(&self) -> &[serde_json::Value] {
        self.value
            .get("tasks")
            .and_then(serde_json::Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Number of planned tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks().len()
    }

    /// The plan title, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.value.get("title").and_then(serde_json::Value::as_str)
    }

    /// The raw plan value.
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl TryFrom<serde_json::Value> for Plan {
    type Error = PlanError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Plan> for serde_json::Value {
    fn from(plan: Plan) -> Self {
        plan.value
    }
}
