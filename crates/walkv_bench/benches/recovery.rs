//! Recovery benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;
use walkv_bench::{populated_log, random_data, BenchEnv};
use walkv_core::{Config, TransactionId, TransactionManager};
use walkv_storage::{FileLogDevice, InMemoryStorage, LogDevice};

/// Benchmark recovering a log of N committed transactions.
fn bench_recovery_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery_scan");
    group.sample_size(20);

    for txns in [100usize, 1_000, 10_000] {
        let log = populated_log(txns, 256, 100).unwrap();
        group.throughput(Throughput::Elements(txns as u64));
        group.bench_with_input(BenchmarkId::from_parameter(txns), &log, |b, log| {
            b.iter(|| {
                let env = BenchEnv::over(Arc::clone(log)).unwrap();
                assert_eq!(env.manager.recovery_report().replayed_writes, txns);
            });
        });
    }

    group.finish();
}

/// Benchmark recovering from a file-backed log.
fn bench_file_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_recovery");
    group.sample_size(10);

    let txns = 1_000u64;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.log");
    {
        let log = Arc::new(FileLogDevice::open(&path).unwrap());
        let mut manager = TransactionManager::recover(
            Config::default(),
            log as Arc<dyn LogDevice>,
            Arc::new(InMemoryStorage::new()),
        )
        .unwrap();
        let value = random_data(100);
        for id in 1..=txns {
            let txid = TransactionId::new(id);
            manager.start(txid).unwrap();
            manager.write(txid, id % 256, value.clone()).unwrap();
            manager.commit(txid).unwrap();
        }
    }

    group.throughput(Throughput::Elements(txns));
    group.bench_function("1000", |b| {
        b.iter(|| {
            let log = Arc::new(FileLogDevice::open(&path).unwrap());
            let manager = TransactionManager::recover(
                Config::default(),
                log,
                Arc::new(InMemoryStorage::new()),
            )
            .unwrap();
            assert_eq!(manager.recovery_report().replayed_writes as u64, txns);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_recovery_scan, bench_file_recovery);

criterion_main!(benches);
