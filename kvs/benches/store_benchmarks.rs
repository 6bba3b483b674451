use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use kvs::store::KvTable;

/// Benchmarks for the bucket-locked table: point writes, point reads and
/// whole-store snapshots at a few population sizes.

fn populated_table(keys: usize) -> KvTable {
    let table = KvTable::new();
    for i in 0..keys {
        table
            .put(&format!("key-{i}"), &format!("value-{i}"))
            .expect("bench keys fit the bounds");
    }
    table
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_put");
    for keys in [256usize, 4096, 16384] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("overwrite", keys), &keys, |b, &keys| {
            let table = populated_table(keys);
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let i = rng.gen_range(0..keys);
                table
                    .put(black_box(&format!("key-{i}")), black_box("fresh"))
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_get");
    for keys in [256usize, 4096, 16384] {
        group.bench_with_input(BenchmarkId::new("hit", keys), &keys, |b, &keys| {
            let table = populated_table(keys);
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let i = rng.gen_range(0..keys);
                black_box(table.get(&format!("key-{i}")));
            });
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_snapshot");
    for keys in [256usize, 4096] {
        group.throughput(Throughput::Elements(keys as u64));
        group.bench_with_input(BenchmarkId::new("deep_copy", keys), &keys, |b, &keys| {
            let table = populated_table(keys);
            b.iter(|| black_box(table.snapshot()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_snapshot);
criterion_main!(benches);
