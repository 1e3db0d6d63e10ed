//! Backtesting engine: a sequential bar-by-bar simulation of one
//! (series, parameter set, evaluator) triple.

pub mod accounting;
pub mod config;
pub mod error;
pub mod loop_runner;
pub mod result;
pub mod state;

pub use accounting::{apply_margin, realized_pnl, round_to, size_position, MarginDecision};
pub use config::{EngineConfig, ExitPolicy, MarginPolicy, DEFAULT_TRAILING_DISTANCE};
pub use error::EngineError;
pub use loop_runner::{run_backtest, RunControl};
pub use result::{BacktestResult, MarginClamp, RunMetadata, SkipReason};
pub use state::RunContext;
