//! Registry Dependency Resolution Benchmarks
//!
//! Run with: cargo bench --bench registry_resolve

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use vrkit::plugins::{Creator, Info, PluginCategory, PluginKind, Registry, TypedRegistryEntry};

struct Bench;

impl PluginCategory for Bench {
    type Handle = Arc<usize>;
    const KIND: PluginKind = PluginKind::Plugin;
    const CREATOR_FUNC_NAME: &'static str = "getCreator";
    const VERSION_FUNC_NAME: &'static str = "getPluginInterfaceVersion";
    const API_MAJOR: u32 = 1;
    const API_MINOR: u32 = 0;
}

fn add(registry: &mut Registry, index: usize, deps: Vec<String>) {
    let info = Info::new("bench", format!("P{}", index), vec![1, 0], "", deps).unwrap();
    let creator = Creator::<Bench>::new(move || Arc::new(index));
    registry.add_entry(Arc::new(TypedRegistryEntry::from_creator(info, creator)));
}

/// P0 depends on P1, which depends on P2, and so on.
fn chain(depth: usize) -> Registry {
    let mut registry = Registry::new();
    for i in 0..depth {
        let deps = if i + 1 < depth {
            vec![format!("bench.P{}", i + 1)]
        } else {
            Vec::new()
        };
        add(&mut registry, i, deps);
    }
    registry
}

/// P0 depends on every other type; each of those depends on its successor.
fn wide(width: usize) -> Registry {
    let mut registry = Registry::new();
    let deps = (1..=width).map(|i| format!("bench.P{}", i)).collect();
    add(&mut registry, 0, deps);
    for i in 1..=width {
        let deps = if i < width {
            vec![format!("bench.P{}", i + 1)]
        } else {
            Vec::new()
        };
        add(&mut registry, i, deps);
    }
    registry
}

fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_chain");

    for depth in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || chain(depth),
                |mut registry| {
                    let result = registry.make_instance(black_box("bench.P0")).unwrap();
                    assert_eq!(result.dependencies.len(), depth - 1);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_wide(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_wide");

    for width in [8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter_batched(
                || wide(width),
                |mut registry| {
                    registry.make_instance(black_box("bench.P0")).unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_lookup(c: &mut Criterion) {
    let mut registry = chain(64);
    registry.make_instance("bench.P0").unwrap();

    c.bench_function("get_instance_by_type", |b| {
        b.iter(|| registry.get_instance_by_type(black_box("bench.P63")).unwrap());
    });
}

criterion_group!(benches, benchmark_chain, benchmark_wide, benchmark_lookup);
criterion_main!(benches);
