use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use stripemap::*;

fn criterion_benchmark(c: &mut Criterion) {
    let count = 1 << 20;
    c.bench_with_input(
        BenchmarkId::new("insert_into_stripemap", count),
        &count,
        |b, &count| {
            b.iter(|| {
                let map = StripeMap::with_capacity_and_shard_amount(1 << 15, 256);
                for i in 0..count {
                    map.insert(i, i);
                }
            })
        },
    );

    let count = 1 << 16;
    c.bench_with_input(
        BenchmarkId::new("lock_update_remove", count),
        &count,
        |b, &count| {
            b.iter(|| {
                let map = StripeMap::with_capacity_and_shard_amount(1 << 10, 256);
                for i in 0..count {
                    let mut guard = map.lock(i % 1024);
                    let next = guard.get().unwrap_or(0) + 1;
                    guard.replace(next);
                    drop(guard);
                    map.remove(&(i % 1024));
                }
            })
        },
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
