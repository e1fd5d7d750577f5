//! Criterion benchmarks for record framing and digesting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use jalop_net_core::{DigestAlgorithm, RecordCodec, RecordEnvelope, RecordType};
use jalop_net_testkit::RecordBuilder;

const PAYLOAD_SIZES: &[usize] = &[1_024, 64 * 1_024, 1_024 * 1_024];
const CHUNK: usize = 16 * 1_024;

fn record(size: usize) -> RecordBuilder {
    RecordBuilder::new(RecordType::Journal, "bench").payload(&vec![0x5a; size])
}

/// Whole body in one `feed` call.
fn benchmark_codec_single_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_single_feed");

    for size in PAYLOAD_SIZES.iter() {
        let builder = record(*size);
        let body = builder.body();
        let headers = builder.headers();
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let envelope = RecordEnvelope::parse(RecordType::Journal, &headers).unwrap();
                let mut codec = RecordCodec::new(envelope, DigestAlgorithm::Sha256);
                codec.feed(&body);
                black_box(codec.finish())
            });
        });
    }
    group.finish();
}

/// Body delivered in transport-sized chunks.
fn benchmark_codec_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_chunked");

    for size in PAYLOAD_SIZES.iter() {
        let builder = record(*size);
        let body = builder.body();
        let headers = builder.headers();
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let envelope = RecordEnvelope::parse(RecordType::Journal, &headers).unwrap();
                let mut codec = RecordCodec::new(envelope, DigestAlgorithm::Sha256);
                for chunk in body.chunks(CHUNK) {
                    black_box(codec.feed(chunk).consumed);
                }
                black_box(codec.finish())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_codec_single_feed, benchmark_codec_chunked);
criterion_main!(benches);
