use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use s7_regsim::{
    decode_real, encode_real, Area, BulkReadCoordinator, ItemAddress, LoopbackDevice, RegionMap,
    TagDescriptor, REAL_SIZE,
};

fn bench_codec(c: &mut Criterion) {
    c.bench_function("encode_real", |b| {
        let mut buffer = [0u8; REAL_SIZE];
        b.iter(|| encode_real(black_box(123.456), &mut buffer, 0).unwrap());
    });

    c.bench_function("decode_real", |b| {
        let mut buffer = [0u8; REAL_SIZE];
        encode_real(123.456, &mut buffer, 0).unwrap();
        b.iter(|| decode_real(black_box(&buffer), 0).unwrap());
    });
}

fn bench_bulk_strategies(c: &mut Criterion) {
    let tags: Vec<_> = (0..50)
        .map(|i| TagDescriptor::new(101, i * REAL_SIZE, i as f32, 1000.0, 1.0, 1000))
        .collect();
    let device = LoopbackDevice::new(Arc::new(RegionMap::build(&tags)));
    let addresses: Vec<_> = (0..50)
        .map(|i| ItemAddress::new(Area::Db(101), i * REAL_SIZE))
        .collect();

    c.bench_function("chunked_50_reals", |b| {
        let coordinator = BulkReadCoordinator::new(&device);
        b.iter(|| coordinator.read_reals_chunked(black_box(&addresses)));
    });

    c.bench_function("contiguous_50_reals", |b| {
        let coordinator = BulkReadCoordinator::new(&device);
        b.iter(|| coordinator.read_reals_contiguous(black_box(Area::Db(101)), 0, 50));
    });
}

criterion_group!(benches, bench_codec, bench_bulk_strategies);
criterion_main!(benches);
