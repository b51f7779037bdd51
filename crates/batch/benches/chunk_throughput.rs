//! Chunk throughput benchmark
//!
//! Measures a full job run (partition → read → process → commit) over the
//! in-memory store, varying chunk size and partition count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use chunkwise_batch::{
    operation_fn, BatchConfig, InMemoryWorkItemStore, ItemFault, JobCoordinator, JobParameters,
    WorkItemStore,
};

const ITEM_COUNT: usize = 10_000;

fn payloads() -> Vec<serde_json::Value> {
    (0..ITEM_COUNT)
        .map(|i| {
            // Every 100th address is invalid so the skip path is exercised too
            let to = if i % 100 == 0 {
                format!("user{i}")
            } else {
                format!("user{i}@example.com")
            };
            serde_json::json!({ "to": to, "subject": "Weekly digest" })
        })
        .collect()
}

async fn run_once(chunk_size: usize, grid_size: usize) -> Duration {
    let store = Arc::new(InMemoryWorkItemStore::new());
    store.insert_pending(payloads()).await.unwrap();

    let send = operation_fn(|payload| async move {
        match payload["to"].as_str() {
            Some(to) if to.contains('@') => Ok(()),
            _ => Err(ItemFault::validation("Invalid email address")),
        }
    });
    let config = BatchConfig::default().with_skip_limit(ITEM_COUNT as u64);
    let coordinator = JobCoordinator::new(store, Arc::new(send), config);

    let start = Instant::now();
    let record = coordinator
        .run(JobParameters::new(grid_size, chunk_size, grid_size))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(record.totals().write_count, ITEM_COUNT as u64);
    elapsed
}

/// Single partition, varying chunk size
fn bench_chunk_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("chunk_throughput/chunk_size");
    group.throughput(Throughput::Elements(ITEM_COUNT as u64));
    group.sample_size(10);

    for chunk_size in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("chunk", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        total += run_once(chunk_size, 1).await;
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

/// Fixed chunk size, varying partition count
fn bench_partitions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("chunk_throughput/partitions");
    group.throughput(Throughput::Elements(ITEM_COUNT as u64));
    group.sample_size(10);

    for grid_size in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("grid", grid_size),
            &grid_size,
            |b, &grid_size| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        total += run_once(100, grid_size).await;
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_size, bench_partitions);
criterion_main!(benches);
