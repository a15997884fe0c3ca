//! Criterion benchmarks for the serial frame decoder.
//!
//! The controller emits a `data` sample every 100 ms, so throughput is never
//! the bottleneck; these benchmarks guard against accidental quadratic
//! behaviour in the buffering path (e.g. re-scanning the buffer per byte).
//!
//! Run with:
//! ```bash
//! cargo bench --package elcb-core --bench decoder_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elcb_core::{decode_line, FrameDecoder};

const DATA_LINE: &str = "{\"type\":\"data\",\"voltage\":231.2,\"current\":0.003,\"fault\":false,\"tripCurrent\":0,\"tripTime\":0}\n";

fn make_stream(lines: usize) -> Vec<u8> {
    DATA_LINE.repeat(lines).into_bytes()
}

fn bench_decode_line(c: &mut Criterion) {
    let line = DATA_LINE.trim_end();
    c.bench_function("decode_line/data", |b| {
        b.iter(|| decode_line(black_box(line)))
    });
}

fn bench_stream_chunking(c: &mut Criterion) {
    let stream = make_stream(256);
    let mut group = c.benchmark_group("frame_decoder/chunk_size");

    for chunk_size in [1usize, 32, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut decoder = FrameDecoder::new();
                    let mut count = 0usize;
                    for chunk in stream.chunks(size) {
                        count += decoder.push(black_box(chunk)).count();
                    }
                    count
                })
            },
        );
    }

    group.finish();
}

fn bench_garbage_without_newlines(c: &mut Criterion) {
    let garbage = vec![b'#'; 64 * 1024];
    c.bench_function("frame_decoder/garbage_64k", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            decoder.push(black_box(&garbage)).count()
        })
    });
}

criterion_group!(
    benches,
    bench_decode_line,
    bench_stream_chunking,
    bench_garbage_without_newlines
);
criterion_main!(benches);
