//! StratLab Core: domain types, signal evaluators and the backtesting engine.
//!
//! - Domain types (bars, price series, parameter sets, positions, trades, equity)
//! - The `SignalEvaluator` contract and reference evaluators
//! - A sequential bar-by-bar engine with fixed-fractional sizing, stop,
//!   target, trailing and max-hold exits
//! - A hash-derived RNG hierarchy for reproducible stochastic search

pub mod domain;
pub mod engine;
pub mod rng;
pub mod signal;

pub use domain::{
    Bar, ClosedTrade, EquitySnapshot, ExitReason, ParamValue, ParameterSet, Position,
    PositionSide, PriceSeries, SeriesError,
};
pub use engine::{run_backtest, BacktestResult, EngineConfig, EngineError, RunControl};
pub use signal::{EvaluatorError, Signal, SignalAction, SignalEvaluator};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything an optimizer shares across worker
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::ParameterSet>();
        require_sync::<domain::ParameterSet>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::ClosedTrade>();
        require_sync::<domain::ClosedTrade>();
        require_send::<domain::EquitySnapshot>();
        require_sync::<domain::EquitySnapshot>();

        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::BacktestResult>();
        require_sync::<engine::BacktestResult>();
        require_send::<engine::EngineError>();
        require_sync::<engine::EngineError>();
        require_send::<engine::RunControl>();
        require_sync::<engine::RunControl>();

        require_send::<signal::Signal>();
        require_sync::<signal::Signal>();
        require_send::<signal::MomentumEvaluator>();
        require_sync::<signal::MomentumEvaluator>();
        require_send::<Box<dyn signal::SignalEvaluator>>();
        require_sync::<Box<dyn signal::SignalEvaluator>>();

        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }
}
