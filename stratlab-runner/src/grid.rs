//! Exhaustive grid search over a discretized parameter space.
//!
//! Combinations are enumerated in parameter-name order with the last
//! parameter varying fastest, evaluated on the rayon pool, and reported in
//! enumeration order regardless of completion order.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use stratlab_core::domain::{ParamValue, ParameterSet};

use crate::config::ParamSpace;
use crate::runner::{best_index, EvalContext, Evaluation, EvaluationOutcome};

/// Result of a grid, random or local search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// One entry per candidate, in enumeration order.
    pub evaluations: Vec<Evaluation>,
    pub best_index: Option<usize>,
    pub cancelled: bool,
}

impl SearchOutcome {
    pub(crate) fn from_evaluations(evaluations: Vec<Evaluation>, ctx: &EvalContext<'_>) -> Self {
        let cancelled = evaluations
            .iter()
            .any(|e| e.outcome == EvaluationOutcome::Cancelled);
        let best_index = best_index(&evaluations, ctx.objective);
        Self {
            evaluations,
            best_index,
            cancelled,
        }
    }

    pub fn best(&self) -> Option<&Evaluation> {
        self.best_index.map(|i| &self.evaluations[i])
    }

    /// Evaluations that actually ran (not skipped by cancellation).
    pub fn evaluations_run(&self) -> usize {
        self.evaluations
            .iter()
            .filter(|e| e.outcome != EvaluationOutcome::Cancelled)
            .count()
    }
}

/// Every combination of `space`, each merged over `base`.
pub fn combinations(space: &ParamSpace, base: &ParameterSet) -> Vec<ParameterSet> {
    let axes: Vec<(&String, Vec<ParamValue>)> = space
        .iter()
        .map(|(name, spec)| (name, spec.grid_values()))
        .collect();
    if axes.is_empty() || axes.iter().any(|(_, values)| values.is_empty()) {
        return Vec::new();
    }

    let total = space.grid_size();
    let mut out = Vec::with_capacity(total);
    let mut odometer = vec![0usize; axes.len()];
    loop {
        let mut params = base.clone();
        for ((name, values), &i) in axes.iter().zip(&odometer) {
            params.insert((*name).clone(), values[i].clone());
        }
        out.push(params);

        // Advance, last axis fastest.
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                return out;
            }
            axis -= 1;
            odometer[axis] += 1;
            if odometer[axis] < axes[axis].1.len() {
                break;
            }
            odometer[axis] = 0;
        }
    }
}

/// Evaluate every combination of `space` once.
pub fn run_grid(
    ctx: &EvalContext<'_>,
    space: &ParamSpace,
    base: &ParameterSet,
    cancel: Option<&AtomicBool>,
) -> SearchOutcome {
    let candidates = combinations(space, base);
    tracing::info!(combinations = candidates.len(), objective = %ctx.objective, "grid search started");
    let outcome = SearchOutcome::from_evaluations(ctx.evaluate_all(candidates, cancel), ctx);
    log_summary("grid", &outcome);
    outcome
}

pub(crate) fn log_summary(kind: &str, outcome: &SearchOutcome) {
    let failures = outcome
        .evaluations
        .iter()
        .filter(|e| matches!(e.outcome, EvaluationOutcome::Failed { .. }))
        .count();
    match outcome.best() {
        Some(best) => tracing::info!(
            kind,
            evaluated = outcome.evaluations_run(),
            failures,
            cancelled = outcome.cancelled,
            best_score = best.score,
            best_params = %best.params,
            "search finished"
        ),
        None => tracing::warn!(
            kind,
            evaluated = outcome.evaluations_run(),
            failures,
            cancelled = outcome.cancelled,
            "search finished without a successful evaluation"
        ),
    }
}
