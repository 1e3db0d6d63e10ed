//! Local search: uniform warm-up samples, then repeated perturbation around
//! the best point found so far.
//!
//! The warm-up batch is evaluated in parallel. Refinement is sequential, since
//! each step is centred on the current best. Every step draws from its own
//! seeded stream, so a run depends only on the seed.
//!
//! Perturbation radius per numeric parameter:
//! - int: `max(1, (max - min) / 10)` whole steps either way
//! - float: 20% of the range either way
//!
//! Values are clamped to bounds. Categorical parameters keep the centre's value.

use std::sync::atomic::AtomicBool;

use rand::Rng;

use stratlab_core::domain::{ParamValue, ParameterSet};
use stratlab_core::rng::RngHierarchy;

use crate::config::{LocalSettings, ParamKind, ParamSpace};
use crate::grid::{log_summary, SearchOutcome};
use crate::runner::{best_index, is_cancelled, EvalContext};

const FLOAT_RADIUS_FRACTION: f64 = 0.2;
const INT_RADIUS_DIVISOR: i64 = 10;

/// A random neighbour of `centre` within the perturbation radius.
pub fn neighbour<R: Rng + ?Sized>(
    space: &ParamSpace,
    centre: &ParameterSet,
    rng: &mut R,
) -> ParameterSet {
    let mut next = centre.clone();
    for (name, spec) in space.iter() {
        let (min, max) = spec.bounds();
        let value = match spec.kind {
            ParamKind::Categorical => continue,
            ParamKind::Int => {
                let (lo, hi) = (min as i64, max as i64);
                let current = centre.get_i64(name).unwrap_or(lo);
                let radius = ((hi - lo) / INT_RADIUS_DIVISOR).max(1);
                let stepped = current.saturating_add(rng.gen_range(-radius..=radius));
                ParamValue::Int(stepped.clamp(lo, hi))
            }
            ParamKind::Float => {
                let current = centre.get_f64(name).unwrap_or(min);
                let radius = (max - min) * FLOAT_RADIUS_FRACTION;
                let stepped = if radius > 0.0 {
                    current + rng.gen_range(-radius..=radius)
                } else {
                    current
                };
                ParamValue::Float(stepped.clamp(min, max))
            }
        };
        next.insert(name.clone(), value);
    }
    next
}

pub fn run_local(
    ctx: &EvalContext<'_>,
    space: &ParamSpace,
    base: &ParameterSet,
    settings: &LocalSettings,
    cancel: Option<&AtomicBool>,
) -> SearchOutcome {
    let rngs = RngHierarchy::new(settings.seed);
    let warmup = settings.initial_samples.min(settings.iterations);
    tracing::info!(
        warmup,
        iterations = settings.iterations,
        seed = settings.seed,
        objective = %ctx.objective,
        "local search started"
    );

    let mut init_rng = rngs.rng_for("local/init", 0);
    let initial: Vec<ParameterSet> = (0..warmup)
        .map(|_| space.sample(&mut init_rng, base))
        .collect();
    let mut evaluations = ctx.evaluate_all(initial, cancel);
    let mut best = best_index(&evaluations, ctx.objective);
    let mut cancelled = is_cancelled(cancel);

    for iteration in warmup..settings.iterations {
        if cancelled {
            break;
        }
        let mut rng = rngs.rng_for("local", iteration as u64);
        let candidate = match best {
            Some(b) => neighbour(space, &evaluations[b].params, &mut rng),
            // Nothing has succeeded yet; keep exploring uniformly.
            None => space.sample(&mut rng, base),
        };
        let eval = ctx.evaluate(candidate);
        let improves = eval.is_success()
            && best.map_or(true, |b| ctx.objective.is_better(eval.score, evaluations[b].score));
        evaluations.push(eval);
        if improves {
            best = Some(evaluations.len() - 1);
        }

        if (iteration + 1) % 10 == 0 {
            tracing::info!(
                iteration = iteration + 1,
                best_score = best.map(|b| evaluations[b].score),
                "local search progress"
            );
        }
        cancelled = is_cancelled(cancel);
    }

    let outcome = SearchOutcome {
        evaluations,
        best_index: best,
        cancelled,
    };
    log_summary("local", &outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn space() -> ParamSpace {
        ParamSpace::new()
            .with("lookback", ParamSpec::int(0, 100))
            .with("threshold", ParamSpec::float(0.0, 10.0))
            .with("mode", ParamSpec::categorical(["a", "b"]))
    }

    fn centre(lookback: i64, threshold: f64) -> ParameterSet {
        ParameterSet::new()
            .with("lookback", ParamValue::Int(lookback))
            .with("threshold", ParamValue::Float(threshold))
            .with("mode", ParamValue::Choice("b".into()))
    }

    #[test]
    fn neighbours_stay_within_radius_and_bounds() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let next = neighbour(&space, &centre(50, 5.0), &mut rng);
            let lookback = next.get_i64("lookback").unwrap();
            assert!((40..=60).contains(&lookback), "{lookback}");
            let threshold = next.get_f64("threshold").unwrap();
            assert!((3.0..=7.0).contains(&threshold), "{threshold}");
            assert_eq!(next.get_choice("mode"), Some("b"));
        }
    }

    #[test]
    fn neighbours_clamp_at_the_edges() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..500 {
            let low = neighbour(&space, &centre(0, 0.0), &mut rng);
            assert!((0..=10).contains(&low.get_i64("lookback").unwrap()));
            assert!((0.0..=2.0).contains(&low.get_f64("threshold").unwrap()));
            let high = neighbour(&space, &centre(100, 10.0), &mut rng);
            assert!((90..=100).contains(&high.get_i64("lookback").unwrap()));
            assert!((8.0..=10.0).contains(&high.get_f64("threshold").unwrap()));
        }
    }

    #[test]
    fn narrow_int_range_still_moves_by_one() {
        let space = ParamSpace::new().with("n", ParamSpec::int(1, 3));
        let mut rng = StdRng::seed_from_u64(13);
        let start = ParameterSet::new().with("n", ParamValue::Int(2));
        let seen: std::collections::BTreeSet<i64> = (0..200)
            .map(|_| neighbour(&space, &start, &mut rng).get_i64("n").unwrap())
            .collect();
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
