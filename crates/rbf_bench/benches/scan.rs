//! Reverse scan benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rbf_bench::utils::{fill, memory_log};
use rbf_core::salvage::salvage_scan;

/// Benchmark a full reverse scan.
fn bench_scan_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_reverse");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let file = memory_log();
            fill(&file, count, 128);

            b.iter(|| {
                let frames = file.scan_reverse(false).count();
                black_box(frames);
            });
        });
    }

    group.finish();
}

/// Benchmark the salvage walk over a clean file.
fn bench_salvage(c: &mut Criterion) {
    let mut group = c.benchmark_group("salvage_scan");
    group.sample_size(20);

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let file = memory_log();
            fill(&file, count, 128);

            b.iter(|| {
                let report = salvage_scan(&file).unwrap();
                black_box(report.frames.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan_reverse, bench_salvage);
criterion_main!(benches);
