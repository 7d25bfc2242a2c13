// Criterion benchmarks for service-queue-broker
//
// Run benchmarks with:
//   cargo bench -p service-queue-broker
//
// For detailed output with plots:
//   cargo bench -p service-queue-broker -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use service_queue_broker::{HeartbeatConfig, Registry, Worker};
use std::time::{Duration, Instant};

fn registry_with(count: usize) -> Registry {
    let registry = Registry::new();
    for i in 0..count {
        registry.register(&format!("worker-{}", i));
    }
    registry
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for worker_count in [1, 5, 20, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(worker_count),
            worker_count,
            |b, &count| {
                let registry = registry_with(count);
                b.iter(|| black_box(registry.try_next()));
            },
        );
    }

    group.finish();
}

fn bench_register_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_remove");

    for worker_count in [5, 20, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(worker_count),
            worker_count,
            |b, &count| {
                let registry = registry_with(count);
                b.iter(|| {
                    registry.register(black_box("transient"));
                    registry.remove(black_box("transient"));
                });
            },
        );
    }

    group.finish();
}

fn bench_heartbeat_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat_scan");
    let config = HeartbeatConfig::default();

    for worker_count in [5, 20, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(worker_count),
            worker_count,
            |b, &count| {
                let registry = registry_with(count);
                let t0 = Instant::now();
                for id in registry.ids() {
                    registry.record_ping(&id, t0);
                }
                let now = t0 + Duration::from_secs(5);
                b.iter(|| {
                    registry
                        .snapshot()
                        .iter()
                        .map(|worker: &Worker| worker.liveness(black_box(now), &config))
                        .count()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_select, bench_register_remove, bench_heartbeat_scan);
criterion_main!(benches);
