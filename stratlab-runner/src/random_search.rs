//! Uniform random search: N independent samples from the parameter space.
//!
//! Samples are drawn serially from one seeded stream before any evaluation
//! starts, so the candidate list depends only on the seed.

use std::sync::atomic::AtomicBool;

use stratlab_core::domain::ParameterSet;
use stratlab_core::rng::RngHierarchy;

use crate::config::{ParamSpace, RandomSettings};
use crate::grid::{log_summary, SearchOutcome};
use crate::runner::EvalContext;

/// The `iterations` candidates a search with `settings` would evaluate.
pub fn sample_candidates(
    space: &ParamSpace,
    base: &ParameterSet,
    settings: &RandomSettings,
) -> Vec<ParameterSet> {
    let mut rng = RngHierarchy::new(settings.seed).rng_for("random", 0);
    (0..settings.iterations)
        .map(|_| space.sample(&mut rng, base))
        .collect()
}

pub fn run_random(
    ctx: &EvalContext<'_>,
    space: &ParamSpace,
    base: &ParameterSet,
    settings: &RandomSettings,
    cancel: Option<&AtomicBool>,
) -> SearchOutcome {
    let candidates = sample_candidates(space, base, settings);
    tracing::info!(
        iterations = candidates.len(),
        seed = settings.seed,
        objective = %ctx.objective,
        "random search started"
    );
    let outcome = SearchOutcome::from_evaluations(ctx.evaluate_all(candidates, cancel), ctx);
    log_summary("random", &outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamSpec;

    fn space() -> ParamSpace {
        ParamSpace::new()
            .with("lookback", ParamSpec::int(3, 10))
            .with("threshold", ParamSpec::float(10.0, 90.0))
    }

    #[test]
    fn same_seed_same_candidates() {
        let settings = RandomSettings { iterations: 25, seed: 9 };
        let a = sample_candidates(&space(), &ParameterSet::new(), &settings);
        let b = sample_candidates(&space(), &ParameterSet::new(), &settings);
        assert_eq!(a.len(), 25);
        assert_eq!(a, b);

        let other = RandomSettings { iterations: 25, seed: 10 };
        assert_ne!(a, sample_candidates(&space(), &ParameterSet::new(), &other));
    }

    #[test]
    fn candidates_respect_bounds() {
        let settings = RandomSettings { iterations: 200, seed: 1 };
        for p in sample_candidates(&space(), &ParameterSet::new(), &settings) {
            let lookback = p.get_i64("lookback").unwrap();
            assert!((3..=10).contains(&lookback));
            let threshold = p.get_f64("threshold").unwrap();
            assert!((10.0..=90.0).contains(&threshold));
        }
    }
}
