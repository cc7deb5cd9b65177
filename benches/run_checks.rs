//! This bench validates a large synthetic item graph with every built-in
//! check enabled, once on a single thread and once in parallel.

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use metamodel::{
    checks::builtin, CheckRunner, Item, ItemGraph, Metamodel, MetamodelSource, ResultLog,
};

const METAMODEL: &str = r#"
needs_types_base_options:
  optional_options:
    status: ^(draft|valid)$
needs_types:
  req:
    title: Requirement
    mandatory_options:
      priority: ^(low|high)$
  spec:
    title: Specification
    mandatory_links:
      implements: req
    optional_links:
      refines: spec
prohibited_words_checks:
  weak:
    types: [req, spec]
    title: [TODO, TBD, should]
graph_checks:
  valid_specs_implement_valid_reqs:
    needs:
      include: spec
      condition: status == valid
    check:
      implements: status == valid
    explanation: Valid specifications may only implement valid requirements.
"#;

fn metamodel() -> Metamodel {
    metamodel::domain::loader::load(MetamodelSource::from_yaml(METAMODEL).unwrap()).unwrap()
}

/// Generates interlinked requirements and specifications, some of them broken.
fn items(count: usize) -> ItemGraph {
    let mut items = Vec::with_capacity(count * 2);
    for i in 0..count {
        let status = if i % 7 == 0 { "draft" } else { "valid" };
        items.push(
            Item::new(format!("req__bench__{i}"), "req")
                .with_field("title", format!("Requirement {i}"))
                .with_field("status", status)
                .with_field("priority", if i % 11 == 0 { "urgent" } else { "high" }),
        );

        let title = if i % 13 == 0 {
            format!("TODO spec {i}")
        } else {
            format!("Spec {i}")
        };
        let mut implements = vec![format!("req__bench__{i}")];
        if i % 17 == 0 {
            implements.push(format!("req__missing__{i}"));
        }
        let mut spec = Item::new(format!("spec__bench__{i}"), "spec")
            .with_field("title", title)
            .with_field("status", "valid")
            .with_links("implements", implements);
        if i > 0 {
            spec = spec.with_links("refines", [format!("spec__bench__{}", i - 1)]);
        }
        items.push(spec);
    }
    ItemGraph::from_items(items).unwrap()
}

fn run_checks(c: &mut Criterion) {
    let metamodel = metamodel();
    let registry = builtin();

    for (name, parallel) in [("run checks sequential", false), ("run checks parallel", true)] {
        let runner = CheckRunner::new(&metamodel, &registry).parallel(parallel);
        c.bench_function(name, |b| {
            b.iter_batched(
                || items(5_000),
                |mut items| {
                    let log = ResultLog::new();
                    runner.run(&mut items, &log).unwrap()
                },
                BatchSize::LargeInput,
            );
        });
    }
}

criterion_group!(benches, run_checks);
criterion_main!(benches);
