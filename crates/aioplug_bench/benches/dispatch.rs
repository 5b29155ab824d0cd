//! Facade dispatch overhead.

use aioplug_bench::{bench_facade, random_buffer};
use aioplug_device::Device;
use aioplug_testkit::MemoryDevice;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;
use tempfile::TempDir;

/// Compare a configuration query through the facade with a direct call.
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let temp_dir = TempDir::new().unwrap();
    let facade = bench_facade(temp_dir.path(), "memory", 1);
    let direct = MemoryDevice::new();

    group.bench_function("facade", |b| {
        b.iter(|| black_box(facade.block_size().unwrap()));
    });
    group.bench_function("direct", |b| {
        b.iter(|| black_box(direct.block_size()));
    });

    group.finish();
}

/// Small in-memory writes, where dispatch cost is visible.
fn bench_small_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_write_64b");
    let temp_dir = TempDir::new().unwrap();
    let facade = bench_facade(temp_dir.path(), "memory", 1);
    let direct = MemoryDevice::new();
    let buffer = random_buffer(64);
    let path = Path::new("small.bin");

    group.bench_function("facade", |b| {
        b.iter(|| facade.write(black_box(&buffer), path, false).unwrap());
    });
    group.bench_function("direct", |b| {
        b.iter(|| direct.write(black_box(&buffer), path, false).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_query, bench_small_write);
criterion_main!(benches);
