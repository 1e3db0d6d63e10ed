//! Run result types.

use crate::domain::{ClosedTrade, EquitySnapshot, ParameterSet};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why an entry signal did not open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Stop at the entry price, or not finite.
    ZeroRiskDistance,
    /// Stop on the wrong side of the entry price.
    InvalidStop,
    /// Sizing produced a quantity that is not strictly positive.
    NonPositiveQuantity,
    /// Rejected by the margin policy.
    MarginRejected,
}

/// A quantity reduction applied by `MarginPolicy::Clamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginClamp {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub requested_quantity: f64,
    pub granted_quantity: f64,
}

/// Diagnostics collected while a run executes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub evaluator: String,
    pub params_fingerprint: String,
    pub bars_processed: usize,
    /// Index of the first bar the evaluator was called on.
    pub warmup_bars: usize,
    pub evaluator_failures: usize,
    /// Buy or sell signals received.
    pub signals_seen: usize,
    pub entries_opened: usize,
    pub entries_skipped: BTreeMap<SkipReason, usize>,
    pub margin_clamps: Vec<MarginClamp>,
}

impl RunMetadata {
    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.entries_skipped.entry(reason).or_default() += 1;
    }

    pub fn total_skipped(&self) -> usize {
        self.entries_skipped.values().sum()
    }
}

/// Output of one backtest run. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub params: ParameterSet,
    pub initial_balance: f64,
    pub final_balance: f64,
    /// Closed trades in exit order.
    pub trades: Vec<ClosedTrade>,
    /// One snapshot per processed bar, plus a closing snapshot when
    /// positions were force-closed at end of data.
    pub equity_curve: Vec<EquitySnapshot>,
    pub metadata: RunMetadata,
}

impl BacktestResult {
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}
