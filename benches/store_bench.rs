//! Benchmarks for simstor record operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use simstor::{F64VectorCodec, Record, RecordStore, StoreConfig, StringCodec};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> RecordStore<String, Vec<f64>> {
    let config = StoreConfig::builder("bench")
        .directory(dir.path())
        .increment(3)
        .build()
        .unwrap();
    RecordStore::open(config, StringCodec, F64VectorCodec).unwrap()
}

fn record(i: usize) -> Record<String, Vec<f64>> {
    Record::new(format!("Key{}", i), vec![1.2 * i as f64, 3.4 * i as f64])
}

fn store_benchmarks(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let preloaded = 1_000;
    for i in 0..preloaded {
        store.insert(&record(i)).unwrap();
    }

    let mut next = preloaded;
    c.bench_function("insert", |b| {
        b.iter(|| {
            store.insert(&record(next)).unwrap();
            next += 1;
        })
    });

    let mut i = 0;
    c.bench_function("read", |b| {
        b.iter(|| {
            store.read(&format!("Key{}", i % preloaded)).unwrap();
            i += 1;
        })
    });

    let mut j = 0;
    c.bench_function("update", |b| {
        b.iter(|| {
            let id = format!("Key{}", j % preloaded);
            store.update(&Record::new(id, vec![-1.2, -3.4])).unwrap();
            j += 1;
        })
    });

    c.bench_function("rewrite_100", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let store = open_store(&dir);
                for i in 0..100 {
                    store.insert(&record(i)).unwrap();
                }
                (dir, store)
            },
            |(_dir, store)| {
                let records: Vec<_> = (0..110).map(record).collect();
                store.rewrite(&records).unwrap();
            },
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, store_benchmarks);
criterion_main!(benches);
