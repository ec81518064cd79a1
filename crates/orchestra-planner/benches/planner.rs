//! Planner throughput.
//!
//! Run with: cargo bench -p orchestra-planner

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orchestra_core::{ChainStep, ConvertedPrompt, ParsedCommand, PromptGateConfig};
use orchestra_planner::{ExecutionPlanner, GateCatalog, GateDefinition};
use std::sync::Arc;

fn planner(gate_count: usize) -> ExecutionPlanner {
    let definitions = (0..gate_count).map(|i| {
        let def = GateDefinition::new(format!("gate-{}", i)).with_category("code");
        if i % 4 == 0 {
            def.methodology("CAGEERF")
        } else {
            def
        }
    });
    let catalog = Arc::new(GateCatalog::new(definitions));
    ExecutionPlanner::new().with_gate_selector(catalog.clone()).with_gate_provider(catalog)
}

fn prompt(id: &str) -> ConvertedPrompt {
    ConvertedPrompt::new(id)
        .with_category("code")
        .with_gates(["clarity", "gate-1"])
        .with_gate_configuration(PromptGateConfig {
            exclude: vec!["gate-2".to_string()],
            framework_gates: Some(false),
            ..Default::default()
        })
}

fn bench_create_plan(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("create_plan");

    for gate_count in [10, 100, 1_000] {
        let planner = planner(gate_count);
        let prompt = prompt("review");
        let parsed = ParsedCommand::single(prompt.clone());

        group.bench_with_input(BenchmarkId::new("single", gate_count), &gate_count, |b, _| {
            b.iter(|| {
                let outcome = runtime.block_on(planner.create_plan(Some(&parsed), &prompt, true, None));
                black_box(outcome.plan.gates().len())
            });
        });
    }
    group.finish();
}

fn bench_create_chain_plan(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let planner = planner(100);
    let steps: Vec<ChainStep> = (1..=5)
        .map(|n| ChainStep::new(n, prompt(&format!("step-{}", n))))
        .collect();
    let parsed = ParsedCommand::chain(steps.clone());

    c.bench_function("create_chain_plan/5_steps", |b| {
        b.iter(|| {
            let outcome = runtime
                .block_on(planner.create_chain_plan(&parsed, &steps, true, None))
                .expect("chain plan");
            black_box(outcome.chain.total_steps())
        });
    });
}

criterion_group!(benches, bench_create_plan, bench_create_chain_plan);
criterion_main!(benches);
