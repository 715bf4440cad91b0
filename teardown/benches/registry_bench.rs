//! Benchmarks for registration and drains.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use teardown::callback::thunk;
use teardown::context::Runtime;
use teardown::registry::CallbackRegistry;

fn registry_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_and_drain");
    for n in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let registry = CallbackRegistry::new();
                for _ in 0..n {
                    registry
                        .register(thunk("noop", || Ok(())))
                        .unwrap();
                }
                black_box(registry.drain().unwrap())
            });
        });
    }
    group.finish();
}

fn isolated_context_benchmark(c: &mut Criterion) {
    let runtime = Runtime::default();
    c.bench_function("run_isolated", |b| {
        b.iter(|| {
            black_box(
                runtime
                    .run_isolated(|ctx| {
                        ctx.register(thunk("noop", || Ok(()))).unwrap();
                    })
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, registry_benchmark, isolated_context_benchmark);
criterion_main!(benches);
