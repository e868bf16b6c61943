//! Stage trait and implementations.
//!
//! Stages are the units of work in a content pipeline. Each one reads a
//! [`StageContext`] and returns either an output or a classified error.

pub mod content;
mod speech;

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

pub use speech::{CommandSynthesizer, SpeechSynthesizer, SynthesizedAudio};

#[cfg(test)]
pub use speech::MockSpeechSynthesizer;

/// Trait for pipeline stages.
///
/// Implementations must be idempotent: a transient failure is retried with
/// the same context.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// Returning [`StageOutput::skip`] declines; only optional stages may
    /// decline.
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;
}
