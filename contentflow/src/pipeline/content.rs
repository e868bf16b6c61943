//! The content generation graph.

use super::{GraphBuilder, PipelineGraph, StageDescriptor};
use crate::core::FanOutRole;
use crate::errors::GraphConfigurationError;
use crate::stages::content::{
    ContentStages, AUDIO_SYNTHESIZER, EVALUATOR, FACT_CHECKER, IMAGE_GENERATOR, IMAGE_PLANNER,
    MERGER, PLANNER, RESEARCHER, ROUTER, SECTION_WRITER, SOCIAL_WRITER,
};

/// Builds the content graph over the given stage implementations.
///
/// ```text
/// router -> researcher -> planner* => section_writer[] => merger
///   merger -> image_planner? -> image_generator?
///   {merger, image_generator} -> fact_checker | social_writer | audio_synthesizer?
///   {fact_checker, social_writer, audio_synthesizer} -> evaluator
/// ```
///
/// `*` marks the interrupt point, `?` a conditional stage.
pub fn content_graph(stages: ContentStages) -> Result<PipelineGraph, GraphConfigurationError> {
    GraphBuilder::new()
        .stage(StageDescriptor::new(ROUTER, stages.router))
        .stage(StageDescriptor::new(RESEARCHER, stages.researcher).with_dependency(ROUTER))
        .stage(
            StageDescriptor::new(PLANNER, stages.planner)
                .with_dependency(RESEARCHER)
                .with_role(FanOutRole::Producer)
                .interrupt(),
        )
        .stage(
            StageDescriptor::new(SECTION_WRITER, stages.section_writer)
                .with_dependency(PLANNER)
                .with_role(FanOutRole::ParallelUnit),
        )
        .stage(
            StageDescriptor::new(MERGER, stages.merger)
                .with_dependency(SECTION_WRITER)
                .with_role(FanOutRole::Reducer),
        )
        .stage(
            StageDescriptor::new(IMAGE_PLANNER, stages.image_planner)
                .with_dependency(MERGER)
                .enabled_if(|o| o.include_images),
        )
        .stage(
            StageDescriptor::new(IMAGE_GENERATOR, stages.image_generator)
                .with_dependency(IMAGE_PLANNER)
                .enabled_if(|o| o.include_images),
        )
        .stage(
            StageDescriptor::new(FACT_CHECKER, stages.fact_checker)
                .with_dependencies([MERGER, IMAGE_GENERATOR]),
        )
        .stage(
            StageDescriptor::new(SOCIAL_WRITER, stages.social_writer)
                .with_dependencies([MERGER, IMAGE_GENERATOR]),
        )
        .stage(
            StageDescriptor::new(AUDIO_SYNTHESIZER, stages.audio_synthesizer)
                .with_dependencies([MERGER, IMAGE_GENERATOR])
                .optional()
                .enabled_if(|o| o.include_audio),
        )
        .stage(
            StageDescriptor::new(EVALUATOR, stages.evaluator)
                .with_dependencies([FACT_CHECKER, SOCIAL_WRITER, AUDIO_SYNTHESIZER]),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StagesConfig;
    use crate::context::GenerationOptions;
    use crate::pipeline::{GraphCursor, NextStep};
    use crate::stages::MockSpeechSynthesizer;
    use std::sync::Arc;

    fn graph() -> PipelineGraph {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_is_available().return_const(false);
        content_graph(ContentStages::offline(&StagesConfig::default(), Arc::new(synth))).unwrap()
    }

    #[test]
    fn test_content_graph_shape() {
        let graph = graph();
        assert_eq!(graph.len(), 11);
        assert_eq!(graph.interrupt_stage(), PLANNER);
        assert_eq!(graph.producer_of(SECTION_WRITER), Some(PLANNER));
        assert_eq!(graph.unit_of(MERGER), Some(SECTION_WRITER));
        assert!(graph.get(AUDIO_SYNTHESIZER).is_some_and(|s| s.optional));
    }

    #[test]
    fn test_branches_run_together_without_images() {
        let graph = graph();
        let options = GenerationOptions {
            include_images: false,
            ..GenerationOptions::default()
        };
        let mut cursor = GraphCursor::new(graph.disabled_for(&options));
        cursor.approve();
        for stage in [ROUTER, RESEARCHER, PLANNER, SECTION_WRITER, MERGER] {
            cursor.complete(stage);
        }

        assert_eq!(
            graph.next(&cursor),
            NextStep::Run(vec![
                FACT_CHECKER.to_string(),
                SOCIAL_WRITER.to_string(),
                AUDIO_SYNTHESIZER.to_string()
            ])
        );
    }
}
