//! Serializable run requests and parameter-space definitions.
//!
//! Requests load from TOML or JSON and are validated before any simulation
//! starts. A request that passes `validate()` cannot fail on configuration
//! grounds later.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::domain::{ParamValue, ParameterSet};
use stratlab_core::engine::{EngineConfig, EngineError};

use crate::metrics::DEFAULT_PERIODS_PER_YEAR;
use crate::objective::{Objective, UnknownObjective};

/// Float grid values are rounded to this many decimals.
const GRID_DECIMALS: i32 = 10;
const DEFAULT_FLOAT_STEP: f64 = 0.1;

/// A request that cannot be run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("parameter space is empty")]
    EmptySpace,
    #[error("parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("engine settings: {0}")]
    InvalidEngine(String),
    #[error("genetic settings: {0}")]
    InvalidGenetic(String),
    #[error("random search settings: {0}")]
    InvalidRandom(String),
    #[error("local search settings: {0}")]
    InvalidLocal(String),
    #[error("start {start} is not before end {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("timeout must be positive, got {0}s")]
    InvalidTimeout(f64),
    #[error("threads must be at least 1")]
    InvalidThreads,
    #[error("periods_per_year must be positive, got {0}")]
    InvalidPeriods(f64),
    #[error(transparent)]
    UnknownObjective(#[from] UnknownObjective),
}

impl From<EngineError> for ValidationError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => Self::InvalidEngine(msg),
            other => Self::InvalidEngine(other.to_string()),
        }
    }
}

/// Errors loading a request from disk or text.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
}

// ─── Parameter space ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Categorical,
}

/// Range or choice set for one tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ParamSpec {
    pub fn int(min: i64, max: i64) -> Self {
        Self {
            kind: ParamKind::Int,
            min: Some(min as f64),
            max: Some(max as f64),
            step: None,
            choices: Vec::new(),
        }
    }

    pub fn float(min: f64, max: f64) -> Self {
        Self {
            kind: ParamKind::Float,
            min: Some(min),
            max: Some(max),
            step: None,
            choices: Vec::new(),
        }
    }

    pub fn categorical<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ParamKind::Categorical,
            min: None,
            max: None,
            step: None,
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// `(min, max)` for numeric kinds. Only meaningful after validation.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min.unwrap_or(0.0), self.max.unwrap_or(0.0))
    }

    pub fn validate(&self, name: &str) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidParam {
            name: name.to_string(),
            reason,
        };
        match self.kind {
            ParamKind::Categorical => {
                if self.choices.is_empty() {
                    return Err(invalid("categorical parameter has no choices".into()));
                }
                Ok(())
            }
            ParamKind::Int | ParamKind::Float => {
                let (min, max) = match (self.min, self.max) {
                    (Some(min), Some(max)) => (min, max),
                    _ => return Err(invalid("numeric parameter needs min and max".into())),
                };
                if !(min.is_finite() && max.is_finite()) {
                    return Err(invalid("bounds must be finite".into()));
                }
                if min > max {
                    return Err(invalid(format!("min {min} is greater than max {max}")));
                }
                if let Some(step) = self.step {
                    if !(step.is_finite() && step > 0.0) {
                        return Err(invalid(format!("step must be positive, got {step}")));
                    }
                }
                if self.kind == ParamKind::Int {
                    let whole = |v: f64| v.fract() == 0.0;
                    if !whole(min) || !whole(max) || self.step.is_some_and(|s| !whole(s)) {
                        return Err(invalid("int bounds and step must be whole numbers".into()));
                    }
                }
                Ok(())
            }
        }
    }

    /// Discretized values, ascending for numeric kinds.
    pub fn grid_values(&self) -> Vec<ParamValue> {
        match self.kind {
            ParamKind::Categorical => self
                .choices
                .iter()
                .map(|c| ParamValue::Choice(c.clone()))
                .collect(),
            ParamKind::Int => {
                let (min, max) = self.bounds();
                let step = self.step.unwrap_or(1.0).max(1.0) as i64;
                let (min, max) = (min as i64, max as i64);
                let mut out = Vec::new();
                let mut v = min;
                while v <= max {
                    out.push(ParamValue::Int(v));
                    v += step;
                }
                out
            }
            ParamKind::Float => {
                let (min, max) = self.bounds();
                let step = self.step.unwrap_or(DEFAULT_FLOAT_STEP);
                let mut out = Vec::new();
                let mut k = 0u64;
                loop {
                    let v = round_grid(min + k as f64 * step);
                    if v > max + 1e-9 {
                        break;
                    }
                    out.push(ParamValue::Float(v.min(max)));
                    k += 1;
                }
                out
            }
        }
    }

    /// Uniform sample respecting the kind.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self.kind {
            ParamKind::Categorical => {
                ParamValue::Choice(self.choices[rng.gen_range(0..self.choices.len())].clone())
            }
            ParamKind::Int => {
                let (min, max) = self.bounds();
                ParamValue::Int(rng.gen_range(min as i64..=max as i64))
            }
            ParamKind::Float => {
                let (min, max) = self.bounds();
                ParamValue::Float(rng.gen_range(min..=max))
            }
        }
    }
}

fn round_grid(v: f64) -> f64 {
    let factor = 10f64.powi(GRID_DECIMALS);
    (v * factor).round() / factor
}

/// Ordered parameter name → spec map. Iteration order is name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSpace(BTreeMap<String, ParamSpec>);

impl ParamSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.0.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::EmptySpace);
        }
        self.0.iter().try_for_each(|(name, spec)| spec.validate(name))
    }

    /// Number of grid combinations, saturating on overflow.
    pub fn grid_size(&self) -> usize {
        self.0
            .values()
            .map(|s| s.grid_values().len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }

    /// One uniform sample per parameter, merged over `base`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, base: &ParameterSet) -> ParameterSet {
        let mut params = base.clone();
        for (name, spec) in &self.0 {
            params.insert(name.clone(), spec.sample(rng));
        }
        params
    }
}

impl FromIterator<(String, ParamSpec)> for ParamSpace {
    fn from_iter<T: IntoIterator<Item = (String, ParamSpec)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ─── Optimizer settings ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Grid,
    Genetic,
    Random,
    /// Warm-up samples, then perturbation around the best point so far.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticSettings {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    /// Individuals carried unchanged into the next generation. Zero disables elitism.
    pub elite_count: usize,
    pub seed: u64,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 10,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            tournament_size: 3,
            elite_count: 1,
            seed: 42,
        }
    }
}

impl GeneticSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidGenetic(msg));
        if self.population_size == 0 {
            return invalid("population_size must be at least 1".into());
        }
        if self.generations == 0 {
            return invalid("generations must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return invalid(format!("mutation_rate must be in [0, 1], got {}", self.mutation_rate));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return invalid(format!(
                "crossover_rate must be in [0, 1], got {}",
                self.crossover_rate
            ));
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size must be at least 1".into());
        }
        if self.elite_count >= self.population_size {
            return invalid(format!(
                "elite_count {} must be smaller than population_size {}",
                self.elite_count, self.population_size
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSettings {
    pub iterations: usize,
    pub seed: u64,
}

impl Default for RandomSettings {
    fn default() -> Self {
        Self {
            iterations: 100,
            seed: 42,
        }
    }
}

impl RandomSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.iterations == 0 {
            return Err(ValidationError::InvalidRandom(
                "iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Uniform samples drawn before refinement starts.
    pub initial_samples: usize,
    /// Total evaluations, warm-up included.
    pub iterations: usize,
    pub seed: u64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            initial_samples: 10,
            iterations: 100,
            seed: 42,
        }
    }
}

impl LocalSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.iterations == 0 {
            return Err(ValidationError::InvalidLocal(
                "iterations must be at least 1".into(),
            ));
        }
        if self.initial_samples == 0 {
            return Err(ValidationError::InvalidLocal(
                "initial_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─── Requests ───────────────────────────────────────────────────────

fn default_periods() -> f64 {
    DEFAULT_PERIODS_PER_YEAR
}

fn validate_range(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start >= end => Err(ValidationError::InvalidRange { start, end }),
        _ => Ok(()),
    }
}

fn validate_periods(periods: f64) -> Result<(), ValidationError> {
    if periods.is_finite() && periods > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidPeriods(periods))
    }
}

/// A single backtest. Engine settings sit at the top level.
///
/// ```toml
/// symbol = "AAPL"
/// start = "2024-01-02T00:00:00"
/// initial_balance = 100000.0
/// risk_per_trade = 0.02
/// max_positions = 1
///
/// [parameters]
/// lookback = 5
/// entry_threshold = 50.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub parameters: ParameterSet,
    #[serde(default = "default_periods")]
    pub periods_per_year: f64,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl BacktestRequest {
    pub fn new(symbol: impl Into<String>, parameters: ParameterSet, engine: EngineConfig) -> Self {
        Self {
            symbol: symbol.into(),
            start: None,
            end: None,
            parameters,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            engine,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_range(self.start, self.end)?;
        validate_periods(self.periods_per_year)?;
        self.engine.validate()?;
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let req: Self = toml::from_str(text)?;
        req.validate()?;
        Ok(req)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let req: Self = serde_json::from_str(text)?;
        req.validate()?;
        Ok(req)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = read_file(path)?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }
}

/// A parameter search.
///
/// ```toml
/// symbol = "EURUSD"
/// optimizer = "genetic"
/// objective = "sharpe_ratio"
/// initial_balance = 100000.0
///
/// [parameters.lookback]
/// kind = "int"
/// min = 3
/// max = 10
///
/// [parameters.mode]
/// kind = "categorical"
/// choices = ["fast", "slow"]
///
/// [genetic]
/// population_size = 30
/// generations = 15
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    #[serde(default = "default_objective")]
    pub objective: String,
    pub parameters: ParamSpace,
    /// Values applied to every candidate; searched parameters win on conflict.
    #[serde(default)]
    pub fixed_parameters: ParameterSet,
    #[serde(default)]
    pub genetic: GeneticSettings,
    #[serde(default)]
    pub random: RandomSettings,
    #[serde(default)]
    pub local: LocalSettings,
    /// Wall-clock budget per evaluation, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    /// Worker threads; defaults to the global rayon pool.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_periods")]
    pub periods_per_year: f64,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

fn default_objective() -> String {
    Objective::default().name().to_string()
}

impl OptimizationRequest {
    pub fn new(symbol: impl Into<String>, optimizer: OptimizerKind, parameters: ParamSpace) -> Self {
        Self {
            name: None,
            symbol: symbol.into(),
            start: None,
            end: None,
            optimizer,
            objective: default_objective(),
            parameters,
            fixed_parameters: ParameterSet::new(),
            genetic: GeneticSettings::default(),
            random: RandomSettings::default(),
            local: LocalSettings::default(),
            timeout_secs: None,
            threads: None,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            engine: EngineConfig::default(),
        }
    }

    pub fn objective(&self) -> Result<Objective, ValidationError> {
        Ok(self.objective.parse()?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_range(self.start, self.end)?;
        validate_periods(self.periods_per_year)?;
        self.objective()?;
        self.parameters.validate()?;
        self.engine.validate()?;
        match self.optimizer {
            OptimizerKind::Grid => {}
            OptimizerKind::Genetic => self.genetic.validate()?,
            OptimizerKind::Random => self.random.validate()?,
            OptimizerKind::Local => self.local.validate()?,
        }
        if let Some(t) = self.timeout_secs {
            if !(t.is_finite() && t > 0.0) {
                return Err(ValidationError::InvalidTimeout(t));
            }
        }
        if self.threads == Some(0) {
            return Err(ValidationError::InvalidThreads);
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let req: Self = toml::from_str(text)?;
        req.validate()?;
        Ok(req)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let req: Self = serde_json::from_str(text)?;
        req.validate()?;
        Ok(req)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = read_file(path)?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
