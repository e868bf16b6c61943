//! Benchmarks for graph validation and scheduling.

use contentflow::config::StagesConfig;
use contentflow::context::GenerationOptions;
use contentflow::pipeline::{content_graph, GraphCursor, NextStep, PipelineGraph};
use contentflow::stages::content::ContentStages;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn walk(graph: &PipelineGraph, options: &GenerationOptions) -> usize {
    let mut cursor = GraphCursor::new(graph.disabled_for(options));
    let mut steps = 0;
    loop {
        steps += 1;
        match graph.next(&cursor) {
            NextStep::Run(stages) => stages.iter().for_each(|s| cursor.complete(s)),
            NextStep::FanOut { unit, .. } => cursor.complete(&unit),
            NextStep::Reduce { reducer, .. } => cursor.complete(&reducer),
            NextStep::AwaitApproval { .. } => cursor.approve(),
            NextStep::Complete | NextStep::Blocked(_) => return steps,
        }
    }
}

fn graph_benchmark(c: &mut Criterion) {
    let stages = ContentStages::from_config(&StagesConfig::default());

    c.bench_function("content_graph_build", |b| {
        b.iter(|| content_graph(black_box(stages.clone())))
    });

    let Ok(graph) = content_graph(stages) else {
        return;
    };
    let all = GenerationOptions::default();
    let text_only = GenerationOptions {
        include_images: false,
        include_audio: false,
        ..GenerationOptions::default()
    };

    c.bench_function("walk_all_stages", |b| b.iter(|| walk(&graph, black_box(&all))));
    c.bench_function("walk_text_only", |b| {
        b.iter(|| walk(&graph, black_box(&text_only)))
    });
}

criterion_group!(benches, graph_benchmark);
criterion_main!(benches);
