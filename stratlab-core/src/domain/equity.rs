use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Account state at the close of one bar.
///
/// `total_equity == balance + unrealized_pnl` holds for every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub timestamp: NaiveDateTime,
    /// Realized balance.
    pub balance: f64,
    pub unrealized_pnl: f64,
    pub total_equity: f64,
}

impl EquitySnapshot {
    pub fn new(timestamp: NaiveDateTime, balance: f64, unrealized_pnl: f64) -> Self {
        Self {
            timestamp,
            balance,
            unrealized_pnl,
            total_equity: balance + unrealized_pnl,
        }
    }
}
