use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stepcompress::compress::compress_bisect_add;

fn uniform_cadence(count: u64, interval: u64) -> Vec<u64> {
    (1..=count).map(|k| k * interval).collect()
}

fn accelerating(count: u64) -> Vec<u64> {
    let mcu_freq = 1_000_000.0f64;
    (1..=count)
        .map(|k| ((k as f64).sqrt() * mcu_freq) as u64)
        .collect()
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_bisect_add");
    for &count in &[64usize, 512, 4096] {
        let uniform = uniform_cadence(count as u64, 2000);
        group.bench_with_input(BenchmarkId::new("uniform", count), &uniform, |b, pending| {
            b.iter(|| compress_bisect_add(black_box(pending), 0, black_box(25_600)));
        });

        let accel = accelerating(count as u64);
        group.bench_with_input(BenchmarkId::new("accelerating", count), &accel, |b, pending| {
            b.iter(|| compress_bisect_add(black_box(pending), 0, black_box(2000)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress);
criterion_main!(benches);
