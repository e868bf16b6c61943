//! Graph builder with structural validation.

use super::{PipelineGraph, StageDescriptor};
use crate::core::FanOutRole;
use crate::errors::GraphConfigurationError;
use std::collections::{HashMap, HashSet};

/// Builder for validated pipeline graphs.
///
/// Stages are collected in declaration order; every invariant is checked in
/// [`GraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    stages: Vec<StageDescriptor>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage.
    #[must_use]
    pub fn stage(mut self, descriptor: StageDescriptor) -> Self {
        self.stages.push(descriptor);
        self
    }

    /// Validates the declared stages and builds the graph.
    ///
    /// Rejects an empty graph, duplicate names, unknown or self
    /// dependencies, cycles, anything other than exactly one well-placed
    /// interrupt point, and parallel units without exactly one producer and
    /// one reducer.
    pub fn build(self) -> Result<PipelineGraph, GraphConfigurationError> {
        if self.stages.is_empty() {
            return Err(GraphConfigurationError::empty());
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(GraphConfigurationError::duplicate(&stage.name));
            }
        }

        let by_name: HashMap<&str, &StageDescriptor> =
            self.stages.iter().map(|s| (s.name.as_str(), s)).collect();

        for stage in &self.stages {
            for dep in &stage.dependencies {
                if dep == &stage.name {
                    return Err(GraphConfigurationError::cycle(vec![
                        stage.name.clone(),
                        stage.name.clone(),
                    ]));
                }
                if !by_name.contains_key(dep.as_str()) {
                    return Err(GraphConfigurationError::missing_dependency(&stage.name, dep));
                }
            }
        }

        self.detect_cycles(&by_name)?;
        let interrupt = self.validate_interrupt()?;
        self.validate_fan_out(&by_name)?;
        self.validate_interrupt_placement(&by_name, &interrupt)?;

        Ok(PipelineGraph::new(self.stages, interrupt))
    }

    fn detect_cycles(
        &self,
        by_name: &HashMap<&str, &StageDescriptor>,
    ) -> Result<(), GraphConfigurationError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for stage in &self.stages {
            if !visited.contains(stage.name.as_str()) {
                if let Some(cycle) =
                    dfs_cycle(&stage.name, by_name, &mut visited, &mut rec_stack, &mut path)
                {
                    return Err(GraphConfigurationError::cycle(cycle));
                }
            }
        }
        Ok(())
    }

    fn validate_interrupt(&self) -> Result<String, GraphConfigurationError> {
        let interrupts: Vec<String> = self
            .stages
            .iter()
            .filter(|s| s.interrupt)
            .map(|s| s.name.clone())
            .collect();

        match interrupts.as_slice() {
            [single] => {
                let stage = self.stages.iter().find(|s| &s.name == single);
                if stage.is_some_and(StageDescriptor::is_conditional) {
                    return Err(GraphConfigurationError::interrupt(
                        format!("Interrupt stage '{single}' cannot be conditional"),
                        interrupts,
                    ));
                }
                Ok(single.clone())
            }
            [] => Err(GraphConfigurationError::interrupt(
                "Pipeline graph has no interrupt point",
                Vec::new(),
            )),
            _ => Err(GraphConfigurationError::interrupt(
                format!(
                    "Pipeline graph has {} interrupt points: {}",
                    interrupts.len(),
                    interrupts.join(", ")
                ),
                interrupts,
            )),
        }
    }

    fn validate_fan_out(
        &self,
        by_name: &HashMap<&str, &StageDescriptor>,
    ) -> Result<(), GraphConfigurationError> {
        for stage in &self.stages {
            if stage.role != FanOutRole::None && stage.is_conditional() {
                return Err(GraphConfigurationError::fan_out(
                    format!("Fan-out stage '{}' cannot be conditional", stage.name),
                    vec![stage.name.clone()],
                ));
            }
            match stage.role {
                FanOutRole::ParallelUnit => {
                    let producers: Vec<&String> = stage
                        .dependencies
                        .iter()
                        .filter(|d| by_name.get(d.as_str()).is_some_and(|s| s.role == FanOutRole::Producer))
                        .collect();
                    if producers.len() != 1 {
                        return Err(GraphConfigurationError::fan_out(
                            format!(
                                "Parallel unit '{}' must depend on exactly one producer, found {}",
                                stage.name,
                                producers.len()
                            ),
                            vec![stage.name.clone()],
                        ));
                    }

                    let reducers: Vec<&str> = self
                        .stages
                        .iter()
                        .filter(|s| s.role == FanOutRole::Reducer && s.dependencies.contains(&stage.name))
                        .map(|s| s.name.as_str())
                        .collect();
                    if reducers.len() != 1 {
                        return Err(GraphConfigurationError::fan_out(
                            format!(
                                "Parallel unit '{}' must feed exactly one reducer, found {}",
                                stage.name,
                                reducers.len()
                            ),
                            vec![stage.name.clone()],
                        ));
                    }
                }
                FanOutRole::Reducer => {
                    let units = stage
                        .dependencies
                        .iter()
                        .filter(|d| {
                            by_name
                                .get(d.as_str())
                                .is_some_and(|s| s.role == FanOutRole::ParallelUnit)
                        })
                        .count();
                    if units != 1 {
                        return Err(GraphConfigurationError::fan_out(
                            format!(
                                "Reducer '{}' must depend on exactly one parallel unit, found {units}",
                                stage.name
                            ),
                            vec![stage.name.clone()],
                        ));
                    }
                }
                FanOutRole::None | FanOutRole::Producer => {}
            }
        }
        Ok(())
    }

    fn validate_interrupt_placement(
        &self,
        by_name: &HashMap<&str, &StageDescriptor>,
        interrupt: &str,
    ) -> Result<(), GraphConfigurationError> {
        let before_interrupt = ancestors(interrupt, by_name);

        for stage in &self.stages {
            match stage.role {
                FanOutRole::Producer
                    if stage.name != interrupt && !before_interrupt.contains(stage.name.as_str()) =>
                {
                    return Err(GraphConfigurationError::interrupt(
                        format!(
                            "Producer '{}' must run before the interrupt point '{interrupt}'",
                            stage.name
                        ),
                        vec![stage.name.clone(), interrupt.to_string()],
                    ));
                }
                FanOutRole::ParallelUnit if !ancestors(&stage.name, by_name).contains(interrupt) => {
                    return Err(GraphConfigurationError::interrupt(
                        format!(
                            "Parallel unit '{}' must run after the interrupt point '{interrupt}'",
                            stage.name
                        ),
                        vec![stage.name.clone(), interrupt.to_string()],
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn dfs_cycle(
    node: &str,
    by_name: &HashMap<&str, &StageDescriptor>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(stage) = by_name.get(node) {
        for dep in &stage.dependencies {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, by_name, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

/// All transitive dependencies of a stage (excluding itself).
fn ancestors<'a>(stage: &str, by_name: &HashMap<&'a str, &'a StageDescriptor>) -> HashSet<&'a str> {
    let mut found = HashSet::new();
    let mut stack: Vec<&str> = by_name
        .get(stage)
        .map(|s| s.dependencies.iter().map(String::as_str).collect())
        .unwrap_or_default();
    while let Some(name) = stack.pop() {
        if let Some((key, descriptor)) = by_name.get_key_value(name) {
            if found.insert(*key) {
                stack.extend(descriptor.dependencies.iter().map(String::as_str));
            }
        }
    }
    found
}
