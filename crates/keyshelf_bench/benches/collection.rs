//! Collection operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keyshelf_bench::{generate_records, runtime};
use keyshelf_core::{Database, EachOptions};
use keyshelf_testkit::{TestDatabase, TEST_OBJECTS};
use serde_json::Value;

async fn populate(db: &Database, records: Vec<Value>) {
    db.open_store(TEST_OBJECTS, |store| async move { store.upsert_many(records).await })
        .await
        .unwrap();
}

/// Benchmark batch upserts in one transaction.
fn bench_batch_upsert(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("batch_upsert");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let db = TestDatabase::memory();
                let records = generate_records(0, batch_size, 64);
                let (db, records) = (&db, &records);
                b.to_async(&rt).iter(|| async move {
                    let batch = records.clone();
                    let keys = db
                        .open_store(TEST_OBJECTS, |store| async move {
                            store.upsert_many(batch).await
                        })
                        .await
                        .unwrap();
                    black_box(keys);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark cursor walks over a populated store.
fn bench_cursor_walk(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("cursor_walk");

    for count in [100, 1000].iter() {
        let db = TestDatabase::memory();
        rt.block_on(populate(&db, generate_records(0, *count, 64)));
        let db = &db;

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("each", count), count, |b, _| {
            b.to_async(&rt).iter(|| async move {
                let values = db
                    .open_store(TEST_OBJECTS, |store| async move {
                        store.each(&EachOptions::new()).await
                    })
                    .await
                    .unwrap();
                black_box(values);
            });
        });
        group.bench_with_input(BenchmarkId::new("get_all", count), count, |b, _| {
            b.to_async(&rt).iter(|| async move {
                let values = db
                    .open_store(TEST_OBJECTS, |store| async move { store.get_all().await })
                    .await
                    .unwrap();
                black_box(values);
            });
        });
    }
    group.finish();
}

/// Benchmark point reads, one transaction each.
fn bench_find(c: &mut Criterion) {
    let rt = runtime();
    let db = TestDatabase::memory();
    rt.block_on(populate(&db, generate_records(0, 1000, 64)));
    let db = &db;

    c.bench_function("find", |b| {
        let mut next = 0usize;
        b.to_async(&rt).iter(|| {
            next = (next + 7) % 1000;
            let id = next;
            async move {
                let value = db
                    .open_store(TEST_OBJECTS, |store| async move { store.find(id).await })
                    .await
                    .unwrap();
                black_box(value);
            }
        });
    });
}

criterion_group!(benches, bench_batch_upsert, bench_cursor_walk, bench_find);

criterion_main!(benches);
