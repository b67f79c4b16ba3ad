//! Benchmarks for the receive path
//!
//! Measures the per-frame cost of:
//! - decoding a received datagram
//! - materializing a full buffer against a schema
//! - diffing two consecutive snapshots
//!
//! Platform: Cross-platform, no I/O

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use coelink::test_utils::{analogue_frame, digital_frame, sample_schema};
use coelink::{ChannelKind, DiffEngine, Frame, FrameBuffer, Materializer};

/// Full buffer alternating analogue and digital frames
fn filled_buffer() -> FrameBuffer {
    let buffer = FrameBuffer::new(100);
    for i in 0..100u32 {
        if i % 2 == 0 {
            buffer.append(analogue_frame(31, 10, f64::from(i) / 10.0, 1));
        } else {
            buffer.append(digital_frame(21, 21, i % 3 == 0));
        }
    }
    buffer
}

fn bench_decode(c: &mut Criterion) {
    let datagram = *analogue_frame(31, 10, 67.8, 1).as_bytes();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(datagram.len() as u64));
    group.bench_function("decode_and_read_slots", |b| {
        b.iter(|| {
            let frame = Frame::decode(black_box(&datagram)).unwrap_or_else(|e| panic!("{e}"));
            for slot in 1..=4 {
                black_box(frame.read_analogue(slot).ok());
            }
        })
    });
    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let snapshot = filled_buffer().snapshot();
    let materializer = Materializer::new(Arc::new(sample_schema()));

    let mut group = c.benchmark_group("materialize");
    group.throughput(Throughput::Elements(snapshot.len() as u64));
    group.bench_function("analogue_100_frames", |b| {
        b.iter(|| black_box(materializer.analogue(black_box(&snapshot))))
    });
    group.bench_function("digital_100_frames", |b| {
        b.iter(|| black_box(materializer.digital(black_box(&snapshot))))
    });
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let snapshot = filled_buffer().snapshot();
    let materializer = Materializer::new(Arc::new(sample_schema()));
    let mut engine = DiffEngine::default();
    // Baseline, then the first report of every channel
    engine.diff(ChannelKind::Analogue, &materializer, &snapshot);
    engine.diff(ChannelKind::Analogue, &materializer, &snapshot);

    c.bench_function("diff_analogue_steady_state", |b| {
        b.iter(|| black_box(engine.diff(ChannelKind::Analogue, &materializer, &snapshot)))
    });
}

criterion_group!(benches, bench_decode, bench_materialize, bench_diff);
criterion_main!(benches);
