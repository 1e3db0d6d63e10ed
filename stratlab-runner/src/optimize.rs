//! Optimization entry point: request in, report out.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use stratlab_core::domain::{ParameterSet, PriceSeries};
use stratlab_core::signal::SignalEvaluator;

use crate::config::{OptimizationRequest, OptimizerKind};
use crate::data_loader::BarSource;
use crate::genetic::{run_genetic, GenerationStats};
use crate::grid::{run_grid, SearchOutcome};
use crate::local_search::run_local;
use crate::metrics::PerformanceMetrics;
use crate::objective::Objective;
use crate::random_search::run_random;
use crate::runner::{install, EvalContext, Evaluation, RunError};

/// Outcome of a parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub symbol: String,
    pub optimizer: OptimizerKind,
    pub objective: Objective,
    /// `None` when no evaluation succeeded.
    pub best_params: Option<ParameterSet>,
    #[serde(with = "crate::serde_float")]
    pub best_score: f64,
    pub best_metrics: Option<PerformanceMetrics>,
    /// Every candidate in evaluation order (grid, random and local search).
    pub evaluations: Vec<Evaluation>,
    /// Per-generation trace (genetic search).
    pub generations: Vec<GenerationStats>,
    pub cancelled: bool,
    pub evaluations_run: usize,
}

impl OptimizationReport {
    fn new(request: &OptimizationRequest, objective: Objective) -> Self {
        Self {
            name: request.name.clone(),
            symbol: request.symbol.clone(),
            optimizer: request.optimizer,
            objective,
            best_params: None,
            best_score: objective.worst(),
            best_metrics: None,
            evaluations: Vec::new(),
            generations: Vec::new(),
            cancelled: false,
            evaluations_run: 0,
        }
    }

    fn set_best(&mut self, best: Option<&Evaluation>) {
        if let Some(best) = best {
            self.best_params = Some(best.params.clone());
            self.best_score = best.score;
            self.best_metrics = best.metrics().cloned();
        }
    }

    fn absorb_search(&mut self, outcome: SearchOutcome) {
        self.set_best(outcome.best());
        self.cancelled = outcome.cancelled;
        self.evaluations_run = outcome.evaluations_run();
        self.evaluations = outcome.evaluations;
    }
}

/// Validate `request`, load its bars and run the requested optimizer.
///
/// Per-candidate failures never abort the search; only request, data and
/// worker-pool errors are returned.
pub fn run_optimization(
    request: &OptimizationRequest,
    source: &dyn BarSource,
    evaluator: &dyn SignalEvaluator,
    cancel: Option<&AtomicBool>,
) -> Result<OptimizationReport, RunError> {
    request.validate()?;
    let series = source.load(&request.symbol, request.start, request.end)?;
    optimize_series(&series, request, evaluator, cancel)
}

/// Run a validated request against pre-loaded bars.
pub fn optimize_series(
    series: &PriceSeries,
    request: &OptimizationRequest,
    evaluator: &dyn SignalEvaluator,
    cancel: Option<&AtomicBool>,
) -> Result<OptimizationReport, RunError> {
    let objective = request.objective()?;
    let ctx = EvalContext::new(series, evaluator, &request.engine, objective)
        .with_timeout(request.timeout())
        .with_periods_per_year(request.periods_per_year);
    let space = &request.parameters;
    let base = &request.fixed_parameters;

    let mut report = OptimizationReport::new(request, objective);
    install(request.threads, || match request.optimizer {
        OptimizerKind::Grid => report.absorb_search(run_grid(&ctx, space, base, cancel)),
        OptimizerKind::Random => {
            report.absorb_search(run_random(&ctx, space, base, &request.random, cancel))
        }
        OptimizerKind::Local => {
            report.absorb_search(run_local(&ctx, space, base, &request.local, cancel))
        }
        OptimizerKind::Genetic => {
            let outcome = run_genetic(&ctx, space, base, &request.genetic, cancel);
            report.set_best(outcome.best.as_ref());
            report.cancelled = outcome.cancelled;
            report.evaluations_run = outcome.evaluations_run;
            report.generations = outcome.generations;
        }
    })?;
    Ok(report)
}
