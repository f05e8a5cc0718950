// Write performance benchmarks for numtable

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use numtable::{Compression, Writer, WriterOptions};
use std::hint::black_box;

fn benchmark_sequential_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_write");

    for size in [1_000usize, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("plain", size), size, |b, &size| {
            let val = [7u8; 128];
            b.iter(|| {
                let mut buf = Vec::with_capacity(size * 140);
                let mut writer = Writer::new(
                    &mut buf,
                    WriterOptions::new().compression(Compression::None),
                );
                for i in 0..size {
                    writer.append((i * 2) as u64, &val).unwrap();
                }
                writer.close().unwrap();
                black_box(buf.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("snappy", size), size, |b, &size| {
            let val = [7u8; 128];
            b.iter(|| {
                let mut buf = Vec::with_capacity(size * 140);
                let mut writer = Writer::new(&mut buf, WriterOptions::default());
                for i in 0..size {
                    writer.append((i * 2) as u64, &val).unwrap();
                }
                writer.close().unwrap();
                black_box(buf.len());
            });
        });
    }

    group.finish();
}

fn benchmark_large_values(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_values");

    for value_size in [256usize, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes((1_000 * value_size) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(value_size),
            value_size,
            |b, &value_size| {
                let val = vec![42u8; value_size];
                b.iter(|| {
                    let mut buf = Vec::new();
                    let mut writer = Writer::new(&mut buf, WriterOptions::default());
                    for i in 0..1_000u64 {
                        writer.append(i, &val).unwrap();
                    }
                    writer.close().unwrap();
                    black_box(buf.len());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_sequential_write, benchmark_large_values);
criterion_main!(benches);
