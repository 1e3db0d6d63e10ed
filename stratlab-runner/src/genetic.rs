//! Genetic-algorithm optimizer.
//!
//! Each generation is evaluated in parallel; breeding (tournament selection,
//! uniform crossover, Gaussian mutation, elitism) runs serially on one RNG
//! per generation derived from the master seed. Results therefore depend on
//! the seed and never on the worker count.
//!
//! Failed individuals keep the objective's worst fitness and never become
//! parents. A generation with no successful individual breeds from fresh
//! random samples instead.

use std::sync::atomic::AtomicBool;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use stratlab_core::domain::{ParamValue, ParameterSet};
use stratlab_core::rng::RngHierarchy;

use crate::config::{GeneticSettings, ParamKind, ParamSpace, ParamSpec};
use crate::runner::{is_cancelled, EvalContext, Evaluation};

/// Mutation standard deviation as a fraction of the parameter's range.
const MUTATION_SIGMA_FRACTION: f64 = 0.1;

// ─── Reporting ──────────────────────────────────────────────────────

/// Fitness summary for one generation, over successful individuals only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    #[serde(with = "crate::serde_float")]
    pub best: f64,
    #[serde(with = "crate::serde_float")]
    pub mean: f64,
    #[serde(with = "crate::serde_float")]
    pub min: f64,
    #[serde(with = "crate::serde_float")]
    pub max: f64,
    pub successes: usize,
    pub failures: usize,
    /// Individuals evaluated this generation (elites carried over are not re-run).
    pub evaluated: usize,
    pub best_params: Option<ParameterSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticOutcome {
    pub generations: Vec<GenerationStats>,
    /// Best successful evaluation across all generations.
    pub best: Option<Evaluation>,
    pub cancelled: bool,
    pub evaluations_run: usize,
}

// ─── Population ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Individual {
    params: ParameterSet,
    /// `None` until evaluated; elites keep theirs across generations.
    evaluation: Option<Evaluation>,
}

impl Individual {
    fn fresh(params: ParameterSet) -> Self {
        Self {
            params,
            evaluation: None,
        }
    }

    fn fitness(&self) -> Option<f64> {
        self.evaluation
            .as_ref()
            .filter(|e| e.is_success())
            .map(|e| e.score)
    }
}

/// Indices of successful individuals, best first; ties keep the lower index.
fn ranked(population: &[Individual]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..population.len())
        .filter(|&i| population[i].fitness().is_some())
        .collect();
    idx.sort_by(|&a, &b| {
        let fa = population[a].fitness().unwrap_or(f64::NEG_INFINITY);
        let fb = population[b].fitness().unwrap_or(f64::NEG_INFINITY);
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    idx
}

fn generation_stats(generation: usize, population: &[Individual], evaluated: usize) -> GenerationStats {
    let scores: Vec<f64> = population.iter().filter_map(Individual::fitness).collect();
    let successes = scores.len();
    let failures = population.len() - successes;
    let best_params = ranked(population)
        .first()
        .map(|&i| population[i].params.clone());
    if scores.is_empty() {
        return GenerationStats {
            generation,
            best: f64::NAN,
            mean: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            successes,
            failures,
            evaluated,
            best_params,
        };
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = scores.iter().sum::<f64>() / successes as f64;
    GenerationStats {
        generation,
        best: max,
        mean,
        min,
        max,
        successes,
        failures,
        evaluated,
        best_params,
    }
}

// ─── Operators ──────────────────────────────────────────────────────

/// Tournament among `pool` (population indices). Ties go to the lower index.
fn tournament(population: &[Individual], pool: &[usize], size: usize, rng: &mut StdRng) -> usize {
    let mut winner = pool[rng.gen_range(0..pool.len())];
    for _ in 1..size {
        let challenger = pool[rng.gen_range(0..pool.len())];
        let (fc, fw) = (
            population[challenger].fitness().unwrap_or(f64::NEG_INFINITY),
            population[winner].fitness().unwrap_or(f64::NEG_INFINITY),
        );
        if fc > fw || (fc == fw && challenger < winner) {
            winner = challenger;
        }
    }
    winner
}

/// Uniform crossover over the searched parameters.
pub fn crossover(
    space: &ParamSpace,
    a: &ParameterSet,
    b: &ParameterSet,
    rng: &mut impl Rng,
) -> ParameterSet {
    let mut child = a.clone();
    for (name, _) in space.iter() {
        if rng.gen_bool(0.5) {
            if let Some(v) = b.get(name) {
                child.insert(name.clone(), v.clone());
            }
        }
    }
    child
}

/// Mutate each searched parameter with probability `rate`, staying in range.
pub fn mutate(space: &ParamSpace, params: &mut ParameterSet, rate: f64, rng: &mut impl Rng) {
    for (name, spec) in space.iter() {
        if rng.gen_bool(rate) {
            let value = mutate_value(spec, params.get(name), rng);
            params.insert(name.clone(), value);
        }
    }
}

fn mutate_value(spec: &ParamSpec, current: Option<&ParamValue>, rng: &mut impl Rng) -> ParamValue {
    let numeric = current.and_then(ParamValue::as_f64);
    match (spec.kind, numeric) {
        (ParamKind::Categorical, _) | (_, None) => spec.sample(rng),
        (ParamKind::Float, Some(v)) => {
            let (min, max) = spec.bounds();
            let sigma = (max - min) * MUTATION_SIGMA_FRACTION;
            ParamValue::Float((v + gaussian(sigma, rng)).clamp(min, max))
        }
        (ParamKind::Int, Some(v)) => {
            let (min, max) = spec.bounds();
            let sigma = ((max - min) * MUTATION_SIGMA_FRACTION).max(1.0);
            let mutated = (v + gaussian(sigma, rng)).round().clamp(min, max);
            ParamValue::Int(mutated as i64)
        }
    }
}

fn gaussian(sigma: f64, rng: &mut impl Rng) -> f64 {
    match Normal::new(0.0, sigma) {
        Ok(normal) if sigma > 0.0 => normal.sample(rng),
        _ => 0.0,
    }
}

fn breed(
    population: &[Individual],
    space: &ParamSpace,
    base: &ParameterSet,
    settings: &GeneticSettings,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let order = ranked(population);
    let mut next: Vec<Individual> = order
        .iter()
        .take(settings.elite_count)
        .map(|&i| population[i].clone())
        .collect();

    if order.is_empty() {
        tracing::warn!("no successful individuals; breeding from fresh samples");
        let parents: Vec<Individual> = (0..settings.population_size)
            .map(|_| Individual::fresh(space.sample(rng, base)))
            .collect();
        let pool: Vec<usize> = (0..parents.len()).collect();
        while next.len() < settings.population_size {
            let a = &parents[pool[rng.gen_range(0..pool.len())]].params;
            let b = &parents[pool[rng.gen_range(0..pool.len())]].params;
            next.push(Individual::fresh(offspring(space, a, b, settings, rng)));
        }
        return next;
    }

    while next.len() < settings.population_size {
        let a = tournament(population, &order, settings.tournament_size, rng);
        let b = tournament(population, &order, settings.tournament_size, rng);
        let child = offspring(space, &population[a].params, &population[b].params, settings, rng);
        next.push(Individual::fresh(child));
    }
    next
}

fn offspring(
    space: &ParamSpace,
    a: &ParameterSet,
    b: &ParameterSet,
    settings: &GeneticSettings,
    rng: &mut StdRng,
) -> ParameterSet {
    let mut child = if rng.gen_bool(settings.crossover_rate) {
        crossover(space, a, b, rng)
    } else {
        a.clone()
    };
    mutate(space, &mut child, settings.mutation_rate, rng);
    child
}

// ─── Driver ─────────────────────────────────────────────────────────

/// Evolve a population for `settings.generations` generations.
///
/// `cancel` is checked between generations; the generation in flight
/// finishes and is reported.
pub fn run_genetic(
    ctx: &EvalContext<'_>,
    space: &ParamSpace,
    base: &ParameterSet,
    settings: &GeneticSettings,
    cancel: Option<&AtomicBool>,
) -> GeneticOutcome {
    let rngs = RngHierarchy::new(settings.seed);
    let mut init_rng = rngs.rng_for("genetic/init", 0);
    let mut population: Vec<Individual> = (0..settings.population_size)
        .map(|_| Individual::fresh(space.sample(&mut init_rng, base)))
        .collect();

    tracing::info!(
        population = settings.population_size,
        generations = settings.generations,
        seed = settings.seed,
        objective = %ctx.objective,
        "genetic search started"
    );

    let mut outcome = GeneticOutcome {
        generations: Vec::with_capacity(settings.generations),
        best: None,
        cancelled: false,
        evaluations_run: 0,
    };

    for generation in 0..settings.generations {
        if is_cancelled(cancel) {
            tracing::info!(generation, "genetic search cancelled");
            outcome.cancelled = true;
            break;
        }

        let pending: Vec<usize> = (0..population.len())
            .filter(|&i| population[i].evaluation.is_none())
            .collect();
        let candidates = pending.iter().map(|&i| population[i].params.clone()).collect();
        let results = ctx.evaluate_all(candidates, None);
        for (&i, eval) in pending.iter().zip(results) {
            population[i].evaluation = Some(eval);
        }
        outcome.evaluations_run += pending.len();

        let stats = generation_stats(generation, &population, pending.len());
        tracing::info!(
            generation,
            best = stats.best,
            mean = stats.mean,
            successes = stats.successes,
            failures = stats.failures,
            "generation evaluated"
        );
        outcome.generations.push(stats);

        if let Some(&top) = ranked(&population).first() {
            let candidate = population[top].evaluation.as_ref();
            let improves = match (&outcome.best, candidate) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(best), Some(c)) => ctx.objective.is_better(c.score, best.score),
            };
            if improves {
                outcome.best = candidate.cloned();
            }
        }

        if generation + 1 < settings.generations {
            let mut rng = rngs.rng_for("genetic", generation as u64);
            population = breed(&population, space, base, settings, &mut rng);
        }
    }

    match &outcome.best {
        Some(best) => tracing::info!(
            best_score = best.score,
            best_params = %best.params,
            evaluations = outcome.evaluations_run,
            "genetic search finished"
        ),
        None => tracing::warn!(
            evaluations = outcome.evaluations_run,
            "genetic search finished without a successful evaluation"
        ),
    }
    outcome
}
