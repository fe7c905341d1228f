//! # Rate Limiter Benchmarks
//!
//! Throughput of the client API: fetch, return and their contended forms.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use tbf::{LimiterConfig, TokenBucketLimiter};

/// Limiter whose refiller effectively never runs, so benchmarks control
/// the token supply themselves.
fn quiet_limiter(max_limiters: usize) -> TokenBucketLimiter {
    TokenBucketLimiter::with_config(LimiterConfig::new(max_limiters, 3_600_000))
        .expect("valid benchmark config")
}

/// Fetch followed by an equal return, so the bucket never drains.
fn bench_fetch_return_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_return_cycle");

    for requested in [1u64, 64, 4096] {
        group.throughput(Throughput::Elements(requested));
        group.bench_with_input(
            BenchmarkId::from_parameter(requested),
            &requested,
            |b, &requested| {
                let limiter = quiet_limiter(1);
                let handle = limiter.create(requested, requested).unwrap();
                limiter.return_tokens(handle, requested).unwrap();

                b.iter(|| {
                    let got = limiter.fetch(handle, requested).unwrap();
                    std::hint::black_box(limiter.return_tokens(handle, got).unwrap())
                });
            },
        );
    }

    group.finish();
}

/// Non-blocking fetch against an empty bucket (the rejection path).
fn bench_try_fetch_empty(c: &mut Criterion) {
    c.bench_function("try_fetch_empty", |b| {
        let limiter = quiet_limiter(1);
        let handle = limiter.create(1, 1).unwrap();
        b.iter(|| std::hint::black_box(limiter.try_fetch(handle, 1).unwrap()));
    });
}

/// Several threads cycling tokens through one bucket.
fn bench_contended_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_bucket");

    for num_threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_threads", num_threads)),
            &num_threads,
            |b, &num_threads| {
                let limiter = Arc::new(quiet_limiter(1));
                let handle = limiter.create(1_000, 1_000).unwrap();
                limiter.return_tokens(handle, 1_000).unwrap();

                b.iter(|| {
                    let workers: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let limiter = limiter.clone();
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    let got = limiter.fetch(handle, 1).unwrap();
                                    limiter.return_tokens(handle, got).unwrap();
                                }
                            })
                        })
                        .collect();
                    for worker in workers {
                        worker.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Metrics snapshot cost.
fn bench_metrics(c: &mut Criterion) {
    c.bench_function("bucket_metrics", |b| {
        let limiter = quiet_limiter(1);
        let handle = limiter.create(10, 100).unwrap();
        b.iter(|| std::hint::black_box(limiter.metrics(handle).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_fetch_return_cycle,
    bench_try_fetch_empty,
    bench_contended_bucket,
    bench_metrics,
);

criterion_main!(benches);
