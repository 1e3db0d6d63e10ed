//! Criterion benchmarks for optimizer hot paths.
//!
//! Benchmarks:
//! 1. Grid sweep over a small momentum space (parallel evaluation)
//! 2. One genetic generation cycle (evaluation plus breeding)
//! 3. Metrics computation on a long equity curve

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stratlab_core::domain::{Bar, ParameterSet, PriceSeries};
use stratlab_core::engine::{run_backtest, EngineConfig, RunControl};
use stratlab_core::signal::MomentumEvaluator;
use stratlab_runner::{
    optimize_series, GeneticSettings, OptimizationRequest, OptimizerKind, ParamSpace, ParamSpec,
    PerformanceMetrics,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> PriceSeries {
    let t0 = NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let bars = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar {
                symbol: "BENCH".to_string(),
                timestamp: t0 + Duration::hours(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000,
            }
        })
        .collect();
    PriceSeries::new("BENCH", bars).unwrap()
}

fn space() -> ParamSpace {
    ParamSpace::new()
        .with("lookback", ParamSpec::int(3, 10))
        .with("entry_threshold", ParamSpec::float(30.0, 70.0).with_step(10.0))
}

// ── 1. Grid sweep ────────────────────────────────────────────────────

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_sweep");
    group.sample_size(10);
    let request = OptimizationRequest::new("BENCH", OptimizerKind::Grid, space());

    for &bars in &[500, 2000] {
        let series = make_series(bars);
        group.bench_with_input(BenchmarkId::new("momentum_40", bars), &bars, |b, _| {
            b.iter(|| optimize_series(black_box(&series), &request, &MomentumEvaluator, None));
        });
    }
    group.finish();
}

// ── 2. Genetic generations ───────────────────────────────────────────

fn bench_genetic(c: &mut Criterion) {
    let series = make_series(1000);
    let mut request = OptimizationRequest::new("BENCH", OptimizerKind::Genetic, space());
    request.genetic = GeneticSettings {
        population_size: 20,
        generations: 3,
        ..GeneticSettings::default()
    };

    let mut group = c.benchmark_group("genetic");
    group.sample_size(10);
    group.bench_function("pop20_gen3_1000_bars", |b| {
        b.iter(|| optimize_series(black_box(&series), &request, &MomentumEvaluator, None));
    });
    group.finish();
}

// ── 3. Metrics ───────────────────────────────────────────────────────

fn bench_metrics(c: &mut Criterion) {
    let series = make_series(10_000);
    let result = run_backtest(
        &series,
        &ParameterSet::new(),
        &MomentumEvaluator,
        &EngineConfig::default(),
        &RunControl::unbounded(),
    )
    .unwrap();

    c.bench_function("metrics_10000_snapshots", |b| {
        b.iter(|| PerformanceMetrics::compute(black_box(&result), 252.0));
    });
}

criterion_group!(benches, bench_grid, bench_genetic, bench_metrics);
criterion_main!(benches);
