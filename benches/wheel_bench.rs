//! Benchmarks for the scheduling hot paths.
//!
//! Covers:
//! - Power-of-two sizing helper
//! - Scheduling churn (add + cancel against a running wheel)
//! - Cron next-occurrence computation

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use timewheel::core::{CronSpec, Repeat, Wheel, WheelPool};
use timewheel::util::pow2::ceil_pow2;

fn bench_ceil_pow2(c: &mut Criterion) {
    c.bench_function("ceil_pow2_1k", |b| {
        b.iter(|| {
            for n in 1..1024usize {
                black_box(ceil_pow2(black_box(n)));
            }
        });
    });
}

fn bench_schedule_churn(c: &mut Criterion) {
    let wheel = Wheel::new(Duration::from_millis(100), 512);
    wheel.start();

    let mut group = c.benchmark_group("schedule");
    group.throughput(Throughput::Elements(1));
    group.bench_function("wheel_add_then_remove", |b| {
        b.iter(|| {
            let handle = wheel
                .add_task(Duration::from_secs(60), Repeat::once(), |_| {})
                .unwrap();
            wheel.remove(handle);
        });
    });
    group.finish();

    wheel.close();
}

fn bench_pool_schedule_churn(c: &mut Criterion) {
    let pool = WheelPool::new(4, Duration::from_millis(100), 512);
    pool.start();

    let mut group = c.benchmark_group("schedule");
    group.throughput(Throughput::Elements(1));
    group.bench_function("pool_add_then_remove", |b| {
        b.iter(|| {
            let handle = pool
                .add_task(Duration::from_secs(60), Repeat::once(), |_| {})
                .unwrap();
            pool.remove(handle);
        });
    });
    group.finish();

    pool.close();
}

fn bench_cron_next_delay(c: &mut Criterion) {
    let daily = CronSpec::daily(5, 0, 0).unwrap();
    let weekly = CronSpec::weekly(1, 5, 0, 0).unwrap();

    c.bench_function("cron_daily_next_delay", |b| {
        b.iter(|| black_box(daily.next_delay()));
    });
    c.bench_function("cron_weekly_next_delay", |b| {
        b.iter(|| black_box(weekly.next_delay()));
    });
}

criterion_group!(
    benches,
    bench_ceil_pow2,
    bench_schedule_churn,
    bench_pool_schedule_churn,
    bench_cron_next_delay
);
criterion_main!(benches);
