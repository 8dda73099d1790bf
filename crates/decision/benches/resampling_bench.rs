//! Performance benchmarks for the seeded resampling loops

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use decision::{bootstrap_mean_diff, mann_whitney, permutation_test};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Zero-inflated revenue sample: about 3% of sessions carry an order value
fn revenue_sample(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            if rng.gen_bool(0.032) {
                rng.gen_range(5.0..150.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Benchmark the bootstrap over growing arm sizes
fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap_mean_diff");
    group.sample_size(10);

    for size in [1_000usize, 10_000, 35_000].iter() {
        let control = revenue_sample(*size, 1);
        let treatment = revenue_sample(*size, 2);
        group.throughput(Throughput::Elements(1_000));

        group.bench_with_input(BenchmarkId::new("1000_resamples", size), size, |b, _| {
            b.iter(|| {
                black_box(bootstrap_mean_diff(&control, &treatment, 1_000, 0.95, 42).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark the permutation test on conversion outcomes
fn bench_permutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutation_test");
    group.sample_size(10);

    for size in [1_000usize, 10_000, 35_000].iter() {
        let control: Vec<f64> = revenue_sample(*size, 3)
            .into_iter()
            .map(|v| if v > 0.0 { 1.0 } else { 0.0 })
            .collect();
        let treatment: Vec<f64> = revenue_sample(*size, 4)
            .into_iter()
            .map(|v| if v > 0.0 { 1.0 } else { 0.0 })
            .collect();
        group.throughput(Throughput::Elements(1_000));

        group.bench_with_input(BenchmarkId::new("1000_permutations", size), size, |b, _| {
            b.iter(|| {
                black_box(permutation_test(&control, &treatment, 1_000, 42).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark the rank-sum test, dominated by the sort
fn bench_mann_whitney(c: &mut Criterion) {
    let mut group = c.benchmark_group("mann_whitney");

    for size in [1_000usize, 35_000].iter() {
        let control = revenue_sample(*size, 5);
        let treatment = revenue_sample(*size, 6);
        group.throughput(Throughput::Elements(2 * *size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(mann_whitney(&control, &treatment).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bootstrap, bench_permutation, bench_mann_whitney);

criterion_main!(benches);
