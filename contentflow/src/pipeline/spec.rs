//! Stage descriptors.

use crate::context::GenerationOptions;
use crate::core::FanOutRole;
use crate::stages::Stage;
use std::sync::Arc;

/// Predicate deciding whether a stage runs for a job's options.
pub type EnablePredicate = Arc<dyn Fn(&GenerationOptions) -> bool + Send + Sync>;

/// Declaration of a single stage in a pipeline graph.
///
/// Immutable once the graph is built.
#[derive(Clone)]
pub struct StageDescriptor {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of the stages this stage depends on, in declared order.
    pub dependencies: Vec<String>,
    /// Role in the fan-out/merge pattern.
    pub role: FanOutRole,
    /// The job pauses for approval after this stage completes.
    pub interrupt: bool,
    /// Failures and declines degrade to a skipped outcome.
    pub optional: bool,
    enabled_if: Option<EnablePredicate>,
}

impl StageDescriptor {
    /// Creates a new stage descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: Vec::new(),
            role: FanOutRole::None,
            interrupt: false,
            optional: false,
            enabled_if: None,
        }
    }

    /// Creates a descriptor named after its runner.
    #[must_use]
    pub fn from_stage(runner: Arc<dyn Stage>) -> Self {
        let name = runner.name().to_string();
        Self::new(name, runner)
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Sets the fan-out role.
    #[must_use]
    pub fn with_role(mut self, role: FanOutRole) -> Self {
        self.role = role;
        self
    }

    /// Marks the stage as the interrupt point.
    #[must_use]
    pub fn interrupt(mut self) -> Self {
        self.interrupt = true;
        self
    }

    /// Marks the stage as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Runs the stage only when the predicate holds for the job's options.
    #[must_use]
    pub fn enabled_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&GenerationOptions) -> bool + Send + Sync + 'static,
    {
        self.enabled_if = Some(Arc::new(predicate));
        self
    }

    /// Returns true if the stage has an enablement predicate.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.enabled_if.is_some()
    }

    /// Returns true if the stage runs for the given options.
    #[must_use]
    pub fn is_enabled(&self, options: &GenerationOptions) -> bool {
        self.enabled_if.as_ref().map_or(true, |p| p(options))
    }
}

impl std::fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("role", &self.role)
            .field("interrupt", &self.interrupt)
            .field("optional", &self.optional)
            .field("conditional", &self.is_conditional())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStage;

    #[test]
    fn test_descriptor_builders() {
        let descriptor = StageDescriptor::from_stage(Arc::new(MockStage::new("audio")))
            .with_dependencies(["merger"])
            .with_dependency("image_generator")
            .optional()
            .enabled_if(|opts| opts.include_audio);

        assert_eq!(descriptor.name, "audio");
        assert_eq!(descriptor.dependencies, vec!["merger", "image_generator"]);
        assert!(descriptor.optional);
        assert!(descriptor.is_conditional());

        let mut options = GenerationOptions::default();
        assert!(descriptor.is_enabled(&options));
        options.include_audio = false;
        assert!(!descriptor.is_enabled(&options));
    }

    #[test]
    fn test_unconditional_always_enabled() {
        let descriptor = StageDescriptor::new("router", Arc::new(MockStage::new("router")))
            .with_role(FanOutRole::Producer)
            .interrupt();
        assert!(descriptor.interrupt);
        assert!(descriptor.is_enabled(&GenerationOptions::default()));
    }
}
