//! # Micro Benchmarks
//!
//! Registry-level costs: bucket lifecycle, handle lookup and statistics.
//!
//! Run with: `cargo bench --bench micro_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tbf::{LimiterConfig, TokenBucketLimiter};

fn quiet_limiter(max_limiters: usize) -> TokenBucketLimiter {
    TokenBucketLimiter::with_config(LimiterConfig::new(max_limiters, 3_600_000))
        .expect("valid benchmark config")
}

/// create + destroy with the registry at different fill levels.
fn bench_create_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_destroy");

    for occupied in [0usize, 512, 1023] {
        group.bench_with_input(
            BenchmarkId::from_parameter(occupied),
            &occupied,
            |b, &occupied| {
                let limiter = quiet_limiter(1024);
                for _ in 0..occupied {
                    limiter.create(1, 1).unwrap();
                }

                b.iter(|| {
                    let handle = limiter.create(10, 100).unwrap();
                    limiter.destroy(black_box(handle)).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Generation-checked lookup of a live handle.
fn bench_handle_lookup(c: &mut Criterion) {
    c.bench_function("handle_lookup", |b| {
        let limiter = quiet_limiter(64);
        let handle = limiter.create(10, 100).unwrap();
        b.iter(|| black_box(limiter.available_tokens(black_box(handle)).unwrap()));
    });
}

/// Rejection of a stale handle.
fn bench_stale_handle(c: &mut Criterion) {
    c.bench_function("stale_handle", |b| {
        let limiter = quiet_limiter(64);
        let handle = limiter.create(10, 100).unwrap();
        limiter.destroy(handle).unwrap();
        b.iter(|| black_box(limiter.try_fetch(black_box(handle), 1).is_err()));
    });
}

/// Registry statistics snapshot.
fn bench_stats(c: &mut Criterion) {
    c.bench_function("registry_stats", |b| {
        let limiter = quiet_limiter(1024);
        for _ in 0..100 {
            limiter.create(1, 1).unwrap();
        }
        b.iter(|| black_box(limiter.stats()));
    });
}

criterion_group!(
    benches,
    bench_create_destroy,
    bench_handle_lookup,
    bench_stale_handle,
    bench_stats,
);

criterion_main!(benches);
