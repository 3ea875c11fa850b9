//! Benchmarks for fan-out throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forkflow::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const ITEMS: u64 = 10_000;

async fn fan_out(forks: usize) {
    let pipeline = ForkingPipeline::from_iter(0..ITEMS);
    let sum = Arc::new(AtomicU64::new(0));
    for i in 0..forks {
        let sum = Arc::clone(&sum);
        let sink = InspectStage::new("sink", move |n: &u64| -> anyhow::Result<()> {
            sum.fetch_add(*n, Ordering::Relaxed);
            Ok(())
        });
        pipeline
            .fork(format!("fork-{i}"), vec![shared(sink)])
            .expect("fork registration");
    }
    pipeline.start_pipeline().expect("start");
    pipeline.done().await.expect("pipeline run");
    black_box(sum.load(Ordering::Relaxed));
}

fn fan_out_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let mut group = c.benchmark_group("fan_out");
    group.throughput(Throughput::Elements(ITEMS));
    for forks in [1_usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(forks), &forks, |b, &forks| {
            b.to_async(&runtime).iter(|| fan_out(forks));
        });
    }
    group.finish();
}

criterion_group!(benches, fan_out_benchmark);
criterion_main!(benches);
