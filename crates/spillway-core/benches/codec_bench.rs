//! Tuple codec and spill throughput.
//!
//! Run with: cargo bench -p spillway-core --bench codec_bench

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use spillway_common::{Tuple, tuple};
use spillway_core::codec::{Serialization, TupleCodec};
use spillway_core::spill::{MemorySpillStorage, SpillThreshold, SpillableTupleList};

const ROWS: usize = 10_000;

fn rows() -> Vec<Tuple> {
    (0..ROWS as i64)
        .map(|i| {
            tuple![
                i,
                format!("user-{i}"),
                (i as f64) * 0.5,
                i % 2 == 0,
                tuple![i % 7, "nested"]
            ]
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let codec = TupleCodec::new(Arc::new(Serialization::empty()));
    let rows = rows();
    let encoded: Vec<Vec<u8>> = rows.iter().map(|t| codec.encode(t).unwrap()).collect();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("encode", |b| {
        let mut buf = Vec::with_capacity(64 * ROWS);
        b.iter(|| {
            buf.clear();
            for row in &rows {
                codec.write_tuple(&mut buf, black_box(row)).unwrap();
            }
        });
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            for bytes in &encoded {
                black_box(codec.decode(bytes).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_spill(c: &mut Criterion) {
    let codec = TupleCodec::new(Arc::new(Serialization::empty()));
    let rows = rows();

    let mut group = c.benchmark_group("spillable_list");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("add_and_iterate", |b| {
        b.iter_batched(
            || {
                SpillableTupleList::new(
                    SpillThreshold::Tuples(1_000),
                    codec.clone(),
                    Arc::new(MemorySpillStorage::new()),
                )
            },
            |mut list| {
                for row in &rows {
                    list.add(row.clone()).unwrap();
                }
                for tuple in list.iter().unwrap() {
                    black_box(tuple.unwrap());
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_codec, bench_spill);
criterion_main!(benches);
