//! Short-term momentum evaluator.
//!
//! Scores the latest bar on three terms:
//! - close-to-close change beyond `min_move` (±50)
//! - deviation of the close from the `lookback`-bar mean beyond `min_deviation` (±25)
//! - two consecutive moves in the same direction (±15)
//!
//! A score at or above `entry_threshold` buys, at or below `-entry_threshold`
//! sells. Stops and targets are fixed percentages of the close.

use super::{EvaluatorError, Signal, SignalEvaluator};
use crate::domain::{Bar, ParameterSet};

const DEFAULT_LOOKBACK: i64 = 5;
const DEFAULT_ENTRY_THRESHOLD: f64 = 50.0;
const DEFAULT_MIN_MOVE: f64 = 0.0005;
const DEFAULT_MIN_DEVIATION: f64 = 0.0008;
const DEFAULT_STOP_PCT: f64 = 0.0005;
const DEFAULT_TAKE_PROFIT_PCT: f64 = 0.003;

#[derive(Debug, Clone, Default)]
pub struct MomentumEvaluator;

impl MomentumEvaluator {
    fn lookback(params: &ParameterSet) -> i64 {
        params.get_i64("lookback").unwrap_or(DEFAULT_LOOKBACK)
    }
}

impl SignalEvaluator for MomentumEvaluator {
    fn name(&self) -> &str {
        "momentum"
    }

    fn min_window(&self, params: &ParameterSet) -> usize {
        Self::lookback(params).max(3) as usize
    }

    fn evaluate(&self, window: &[Bar], params: &ParameterSet) -> Result<Signal, EvaluatorError> {
        let lookback = Self::lookback(params);
        if lookback < 2 {
            return Err(EvaluatorError::InvalidParameter {
                name: "lookback".into(),
                reason: format!("must be at least 2, got {lookback}"),
            });
        }
        let needed = self.min_window(params);
        if window.len() < needed {
            return Err(EvaluatorError::InsufficientWindow {
                needed,
                got: window.len(),
            });
        }

        let entry_threshold = params.f64_or("entry_threshold", DEFAULT_ENTRY_THRESHOLD);
        let min_move = params.f64_or("min_move", DEFAULT_MIN_MOVE);
        let min_deviation = params.f64_or("min_deviation", DEFAULT_MIN_DEVIATION);
        let stop_pct = params.f64_or("stop_pct", DEFAULT_STOP_PCT);
        let take_profit_pct = params.f64_or("take_profit_pct", DEFAULT_TAKE_PROFIT_PCT);

        let n = window.len();
        let close = window[n - 1].close;
        let prev = window[n - 2].close;
        let prev2 = window[n - 3].close;

        let recent = &window[n - lookback as usize..];
        let mean = recent.iter().map(|b| b.close).sum::<f64>() / recent.len() as f64;

        let change = (close - prev) / prev;
        let prev_change = (prev - prev2) / prev2;
        let deviation = (close - mean) / mean;

        let mut score = 0.0;
        if change > min_move {
            score += 50.0;
        } else if change < -min_move {
            score -= 50.0;
        }
        if deviation > min_deviation {
            score += 25.0;
        } else if deviation < -min_deviation {
            score -= 25.0;
        }
        if change > 0.0 && prev_change > 0.0 {
            score += 15.0;
        } else if change < 0.0 && prev_change < 0.0 {
            score -= 15.0;
        }

        if score >= entry_threshold {
            Ok(Signal::buy(
                score,
                Some(close * (1.0 - stop_pct)),
                Some(close * (1.0 + take_profit_pct)),
            ))
        } else if score <= -entry_threshold {
            Ok(Signal::sell(
                score.abs(),
                Some(close * (1.0 + stop_pct)),
                Some(close * (1.0 - take_profit_pct)),
            ))
        } else {
            Ok(Signal::hold())
        }
    }
}
