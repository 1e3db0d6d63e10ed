//! Signal evaluation: the pluggable decision rule consumed by the engine.
//!
//! Evaluators are pure functions of `(window, params)`: they receive bar history
//! up to and including the current bar, never portfolio or position state, and
//! must return identical output for identical input.

pub mod momentum;

use crate::domain::{Bar, ParameterSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decision emitted for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// An immutable, fixed-shape decision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// Confidence score. Scale is evaluator-defined.
    pub score: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Signal {
    pub fn hold() -> Self {
        Self {
            action: SignalAction::Hold,
            score: 0.0,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn buy(score: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        Self {
            action: SignalAction::Buy,
            score,
            stop_loss,
            take_profit,
        }
    }

    pub fn sell(score: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        Self {
            action: SignalAction::Sell,
            score,
            stop_loss,
            take_profit,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.action, SignalAction::Buy | SignalAction::Sell)
    }
}

/// Evaluator failure. The engine absorbs these as `hold` for the bar.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluatorError {
    #[error("window of {got} bars is shorter than the required {needed}")]
    InsufficientWindow { needed: usize, got: usize },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("evaluator failed: {0}")]
    Failed(String),
}

/// Trait for signal evaluators.
///
/// # Contract
/// `evaluate` must only read `window` and `params`. The engine passes
/// `series.window(i)`, so the last element of `window` is the current bar.
pub trait SignalEvaluator: Send + Sync {
    /// Human-readable name (e.g., "momentum").
    fn name(&self) -> &str;

    /// Minimum number of bars required before the evaluator can produce output.
    ///
    /// A series shorter than this is rejected before simulation starts.
    fn min_window(&self, params: &ParameterSet) -> usize;

    fn evaluate(&self, window: &[Bar], params: &ParameterSet) -> Result<Signal, EvaluatorError>;
}

/// Always holds. Useful as a baseline and in tests.
pub struct HoldEvaluator;

impl SignalEvaluator for HoldEvaluator {
    fn name(&self) -> &str {
        "hold"
    }

    fn min_window(&self, _params: &ParameterSet) -> usize {
        1
    }

    fn evaluate(&self, _window: &[Bar], _params: &ParameterSet) -> Result<Signal, EvaluatorError> {
        Ok(Signal::hold())
    }
}

pub use momentum::MomentumEvaluator;
