//! Push-path throughput: the hot path of every producer edge.

use core_buffer::{BufferKind, InputBuffer, OverflowPolicy};
use core_data::{AnyData, Value};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("input_buffer_push");

    group.bench_function("fifo_count_bound", |b| {
        let mut buf = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(1000));
        let mut t = 0i64;
        b.iter(|| {
            t += 1;
            black_box(buf.push(AnyData::new(Value::F64(0.5), t)));
        });
    });

    group.bench_function("fifo_memory_bound", |b| {
        let mut buf = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::memory(64 * 1024));
        let payload = Value::bytes(vec![0u8; 512]);
        let mut t = 0i64;
        b.iter(|| {
            t += 1;
            black_box(buf.push(AnyData::new(payload.clone(), t)));
        });
    });

    group.bench_function("last_only_replace", |b| {
        let mut buf = InputBuffer::new(BufferKind::LastOnly, OverflowPolicy::default());
        let mut t = 0i64;
        b.iter(|| {
            t += 1;
            black_box(buf.push(AnyData::new(Value::F64(0.5), t)));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push);
criterion_main!(benches);
