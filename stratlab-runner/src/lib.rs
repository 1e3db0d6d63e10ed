//! StratLab Runner: backtest orchestration, performance metrics and
//! parameter search.
//!
//! This crate builds on `stratlab-core` to provide:
//! - Request types loaded from TOML or JSON, validated up front
//! - Bar sources (in-memory and per-symbol CSV files)
//! - Single-backtest runner producing a result plus performance metrics
//! - Grid, random, local and genetic-algorithm optimizers over a parameter space
//! - JSON and CSV export of reports and evaluation traces

pub mod config;
pub mod data_loader;
pub mod export;
pub mod genetic;
pub mod grid;
pub mod local_search;
pub mod metrics;
pub mod objective;
pub mod optimize;
pub mod random_search;
pub mod runner;
pub(crate) mod serde_float;

pub use config::{
    BacktestRequest, ConfigError, GeneticSettings, LocalSettings, OptimizationRequest,
    OptimizerKind, ParamKind, ParamSpace, ParamSpec, RandomSettings, ValidationError,
};
pub use data_loader::{BarSource, CsvSource, InMemorySource, SourceError};
pub use export::ExportError;
pub use genetic::{run_genetic, GenerationStats, GeneticOutcome};
pub use grid::{run_grid, SearchOutcome};
pub use local_search::run_local;
pub use metrics::PerformanceMetrics;
pub use objective::{Objective, UnknownObjective};
pub use optimize::{optimize_series, run_optimization, OptimizationReport};
pub use random_search::run_random;
pub use runner::{
    run_on_series, run_single_backtest, BacktestReport, EvalContext, Evaluation,
    EvaluationOutcome, RunError,
};
