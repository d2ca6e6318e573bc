use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use apopeira::{LimitConfig, LimitKey, LimitStore, MemoryLimitStore};

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_store");

    let store = MemoryLimitStore::new();
    // A limit high enough that the bench never hits rejection.
    let config = LimitConfig::new(u32::MAX, 60).unwrap();
    let key = LimitKey::try_from("bench:/consume".to_string()).unwrap();

    group.bench_function("consume", |b| {
        b.iter(|| {
            futures::executor::block_on(store.consume(black_box(&key), &config)).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_consume);
criterion_main!(benches);
