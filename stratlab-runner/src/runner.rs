//! Backtest runner: wires bar sources, the engine and metrics together.
//!
//! Two layers:
//! - `run_single_backtest()`: validates a request, loads bars and runs once.
//!   Every error surfaces to the caller.
//! - `EvalContext::evaluate()`: the per-candidate step shared by all
//!   optimizers. Errors never escape; they become `EvaluationOutcome::Failed`
//!   with the objective's worst score.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::domain::{ParameterSet, PriceSeries};
use stratlab_core::engine::{run_backtest, BacktestResult, EngineConfig, EngineError, RunControl};
use stratlab_core::signal::SignalEvaluator;

use crate::config::{BacktestRequest, ValidationError};
use crate::data_loader::{BarSource, SourceError};
use crate::metrics::PerformanceMetrics;
use crate::objective::Objective;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("data error: {0}")]
    Source(#[from] SourceError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A finished single backtest: the raw result plus its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub result: BacktestResult,
    pub metrics: PerformanceMetrics,
}

/// Validate `request`, load its bars from `source` and run once.
pub fn run_single_backtest(
    request: &BacktestRequest,
    source: &dyn BarSource,
    evaluator: &dyn SignalEvaluator,
) -> Result<BacktestReport, RunError> {
    request.validate()?;
    let series = source.load(&request.symbol, request.start, request.end)?;
    run_on_series(&series, request, evaluator)
}

/// Run a validated request against pre-loaded bars.
pub fn run_on_series(
    series: &PriceSeries,
    request: &BacktestRequest,
    evaluator: &dyn SignalEvaluator,
) -> Result<BacktestReport, RunError> {
    let result = run_backtest(
        series,
        &request.parameters,
        evaluator,
        &request.engine,
        &RunControl::unbounded(),
    )?;
    let metrics = PerformanceMetrics::compute(&result, request.periods_per_year);
    tracing::info!(
        symbol = %request.symbol,
        evaluator = evaluator.name(),
        trades = metrics.trade_count,
        final_balance = metrics.final_balance,
        "backtest complete"
    );
    Ok(BacktestReport { result, metrics })
}

// ─── Optimizer evaluations ──────────────────────────────────────────

/// How one candidate evaluation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Success { metrics: PerformanceMetrics },
    Failed { reason: String },
    /// Skipped because the search was cancelled before it started.
    Cancelled,
}

/// One candidate and its score. Non-success outcomes score the objective's worst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub params: ParameterSet,
    pub outcome: EvaluationOutcome,
    #[serde(with = "crate::serde_float")]
    pub score: f64,
}

impl Evaluation {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Success { .. })
    }

    pub fn metrics(&self) -> Option<&PerformanceMetrics> {
        match &self.outcome {
            EvaluationOutcome::Success { metrics } => Some(metrics),
            _ => None,
        }
    }

    fn cancelled(params: ParameterSet, objective: Objective) -> Self {
        Self {
            params,
            outcome: EvaluationOutcome::Cancelled,
            score: objective.worst(),
        }
    }
}

/// Everything an optimizer needs to score one `ParameterSet`.
///
/// Shared by reference across worker threads; each evaluation allocates its
/// own run state.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub series: &'a PriceSeries,
    pub evaluator: &'a dyn SignalEvaluator,
    pub engine: &'a EngineConfig,
    pub objective: Objective,
    pub timeout: Option<Duration>,
    pub periods_per_year: f64,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        series: &'a PriceSeries,
        evaluator: &'a dyn SignalEvaluator,
        engine: &'a EngineConfig,
        objective: Objective,
    ) -> Self {
        Self {
            series,
            evaluator,
            engine,
            objective,
            timeout: None,
            periods_per_year: crate::metrics::DEFAULT_PERIODS_PER_YEAR,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_periods_per_year(mut self, periods_per_year: f64) -> Self {
        self.periods_per_year = periods_per_year;
        self
    }

    /// Run one backtest and score it. Never fails.
    pub fn evaluate(&self, params: ParameterSet) -> Evaluation {
        let control = RunControl::with_timeout(self.timeout);
        match run_backtest(self.series, &params, self.evaluator, self.engine, &control) {
            Ok(result) => {
                let metrics = PerformanceMetrics::compute(&result, self.periods_per_year);
                let score = self.objective.score(&metrics);
                tracing::debug!(%params, score, trades = metrics.trade_count, "evaluated");
                Evaluation {
                    params,
                    outcome: EvaluationOutcome::Success { metrics },
                    score,
                }
            }
            Err(e) => {
                tracing::warn!(%params, error = %e, "evaluation failed");
                Evaluation {
                    params,
                    outcome: EvaluationOutcome::Failed {
                        reason: e.to_string(),
                    },
                    score: self.objective.worst(),
                }
            }
        }
    }

    /// Evaluate candidates in parallel. Output order matches input order.
    /// `cancel` is checked before each candidate starts.
    pub fn evaluate_all(
        &self,
        candidates: Vec<ParameterSet>,
        cancel: Option<&AtomicBool>,
    ) -> Vec<Evaluation> {
        candidates
            .into_par_iter()
            .map(|params| {
                if is_cancelled(cancel) {
                    Evaluation::cancelled(params, self.objective)
                } else {
                    self.evaluate(params)
                }
            })
            .collect()
    }
}

pub(crate) fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Index of the best successful evaluation. Ties keep the earliest index.
pub fn best_index(evaluations: &[Evaluation], objective: Objective) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, e) in evaluations.iter().enumerate() {
        if !e.is_success() {
            continue;
        }
        match best {
            Some(b) if !objective.is_better(e.score, evaluations[b].score) => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Run `op` on a dedicated pool of `threads` workers, or on the global pool.
pub(crate) fn install<R, F>(threads: Option<usize>, op: F) -> Result<R, RunError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use stratlab_core::domain::{Bar, ParamValue};
    use stratlab_core::signal::{HoldEvaluator, MomentumEvaluator};

    use crate::data_loader::InMemorySource;

    fn series(closes: &[f64]) -> PriceSeries {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                symbol: "TEST".into(),
                timestamp: t0 + ChronoDuration::hours(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 100,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn hold_run_keeps_balance() {
        let source = InMemorySource::new().with_series(series(&[100.0; 20]));
        let request = BacktestRequest::new("TEST", ParameterSet::new(), EngineConfig::default());
        let report = run_single_backtest(&request, &source, &HoldEvaluator).unwrap();
        assert_eq!(report.metrics.trade_count, 0);
        assert_eq!(report.metrics.final_balance, 100_000.0);
        assert_eq!(report.result.final_balance, 100_000.0);
    }

    #[test]
    fn single_backtest_surfaces_errors() {
        let source = InMemorySource::new().with_series(series(&[100.0; 2]));
        let request = BacktestRequest::new("TEST", ParameterSet::new(), EngineConfig::default());
        let err = run_single_backtest(&request, &source, &MomentumEvaluator).unwrap_err();
        assert!(matches!(err, RunError::Engine(EngineError::InsufficientData { .. })));

        let missing = BacktestRequest::new("NOPE", ParameterSet::new(), EngineConfig::default());
        assert!(matches!(
            run_single_backtest(&missing, &source, &HoldEvaluator),
            Err(RunError::Source(SourceError::UnknownSymbol(_)))
        ));

        let mut invalid = request.clone();
        invalid.engine.initial_balance = 0.0;
        assert!(matches!(
            run_single_backtest(&invalid, &source, &HoldEvaluator),
            Err(RunError::Validation(_))
        ));
    }

    #[test]
    fn failed_evaluation_scores_worst() {
        let s = series(&[100.0; 3]);
        let engine = EngineConfig::default();
        let ctx = EvalContext::new(&s, &MomentumEvaluator, &engine, Objective::SharpeRatio);
        let eval = ctx.evaluate(ParameterSet::new().with("lookback", ParamValue::Int(10)));
        assert!(matches!(eval.outcome, EvaluationOutcome::Failed { .. }));
        assert_eq!(eval.score, f64::NEG_INFINITY);
    }

    #[test]
    fn cancelled_batch_runs_nothing() {
        let s = series(&[100.0; 10]);
        let engine = EngineConfig::default();
        let ctx = EvalContext::new(&s, &HoldEvaluator, &engine, Objective::TotalProfit);
        let flag = AtomicBool::new(true);
        let evals = ctx.evaluate_all(vec![ParameterSet::new(); 4], Some(&flag));
        assert_eq!(evals.len(), 4);
        assert!(evals.iter().all(|e| e.outcome == EvaluationOutcome::Cancelled));
    }

    #[test]
    fn best_index_prefers_earliest_tie() {
        let make = |score: f64, ok: bool| Evaluation {
            params: ParameterSet::new(),
            outcome: if ok {
                EvaluationOutcome::Success {
                    metrics: PerformanceMetrics::compute(
                        &run_backtest(
                            &series(&[1.0; 3]),
                            &ParameterSet::new(),
                            &HoldEvaluator,
                            &EngineConfig::default(),
                            &RunControl::unbounded(),
                        )
                        .unwrap(),
                        252.0,
                    ),
                }
            } else {
                EvaluationOutcome::Failed { reason: "x".into() }
            },
            score,
        };
        let evals = vec![
            make(f64::NEG_INFINITY, false),
            make(1.0, true),
            make(2.0, true),
            make(2.0, true),
        ];
        assert_eq!(best_index(&evals, Objective::TotalProfit), Some(2));
        assert_eq!(best_index(&evals[..1], Objective::TotalProfit), None);
    }

    #[test]
    fn evaluation_serializes_worst_score() {
        let eval = Evaluation {
            params: ParameterSet::new(),
            outcome: EvaluationOutcome::Failed { reason: "boom".into() },
            score: f64::NEG_INFINITY,
        };
        let json = serde_json::to_string(&eval).unwrap();
        assert!(json.contains(r#""status":"failed""#));
        assert!(json.contains(r#""score":"-inf""#));
        let back: Evaluation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eval);
    }
}
