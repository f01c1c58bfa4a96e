//! Criterion micro-benchmarks for the step-stream codec.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use sluice_bench::DiffusionProfile;
use sluice_stream::codec::{decode_step_payload, encode_step_payload};
use sluice_stream::checksum;

/// Benchmark: encode one reference-profile step.
fn bench_encode_step(c: &mut Criterion) {
    let frame = DiffusionProfile::reference().step(42, 0);
    c.bench_function("codec_encode_step", |b| {
        b.iter(|| {
            let payload = encode_step_payload(black_box(&frame)).unwrap();
            black_box(payload);
        });
    });
}

/// Benchmark: decode the same step.
fn bench_decode_step(c: &mut Criterion) {
    let payload = encode_step_payload(&DiffusionProfile::reference().step(42, 0)).unwrap();
    c.bench_function("codec_decode_step", |b| {
        b.iter(|| {
            let frame = decode_step_payload(black_box(&payload)).unwrap();
            black_box(frame);
        });
    });
}

/// Benchmark: checksum the encoded step.
fn bench_checksum_step(c: &mut Criterion) {
    let payload = encode_step_payload(&DiffusionProfile::reference().step(42, 0)).unwrap();
    c.bench_function("checksum_step", |b| {
        b.iter(|| black_box(checksum(black_box(&payload))));
    });
}

criterion_group!(
    benches,
    bench_encode_step,
    bench_decode_step,
    bench_checksum_step
);
criterion_main!(benches);
