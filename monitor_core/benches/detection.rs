use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use monitor_core::util::trailing_slope_per_min;
use monitor_core::RunningStats;

// Tiny deterministic PRNG, no extra dependency needed for synthetic traces.
fn synth_trace(n: usize, noise_amp: f64, seed: u32) -> Vec<(u64, f64)> {
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x as f64) / (u32::MAX as f64 + 1.0)
    };
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let t_ms = i as u64 * 2000; // 2s sampling period
        let base = 260.0 + (i as f64 / 30.0).sin() * 5.0;
        let noise = (next_f64() * 2.0 - 1.0) * noise_amp;
        v.push((t_ms, base + noise));
    }
    v
}

fn bench_trailing_slope(c: &mut Criterion) {
    let mut g = c.benchmark_group("trailing_slope_per_min");
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }

    // A 60s trailing window at 2s sampling is ~30 points; this is the
    // per-tick workload `ZoneDetector::step` actually pays.
    let points = synth_trace(30, 0.3, 0xC0FFEE);

    g.bench_function("30_point_window", |b| {
        b.iter_batched(
            || points.clone(),
            |pts| {
                black_box(trailing_slope_per_min(black_box(&pts)));
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

fn bench_running_stats(c: &mut Criterion) {
    let mut g = c.benchmark_group("running_stats");
    let trace = synth_trace(10_000, 0.3, 0xDEADBEEF);

    g.bench_function("update_10k_samples", |b| {
        b.iter_batched(
            RunningStats::new,
            |mut stats| {
                for &(t, v) in &trace {
                    stats.update(black_box(v), black_box(t));
                }
                black_box(stats.snapshot());
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(detection, bench_trailing_slope, bench_running_stats);
criterion_main!(detection);
