//! Position: one open slot inside a single simulation run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open position.
///
/// Owned by exactly one engine run and never shared across runs or threads.
/// `quantity` is always strictly positive; direction lives in `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_time: NaiveDateTime,
    pub entry_bar: usize,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    /// Best close seen since entry: highest for longs, lowest for shorts.
    /// Only tracked when a trailing stop is active.
    pub water_mark: Option<f64>,
    /// Score of the signal that opened the position.
    pub signal_score: f64,
}

impl Position {
    /// Unrealized PnL at `price`. Long: `(price - entry) * qty`; short: `(entry - price) * qty`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - price) * self.quantity,
        }
    }

    /// Notional exposure at entry.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    pub fn stop_hit(&self, close: f64) -> bool {
        match self.side {
            PositionSide::Long => close <= self.stop_loss,
            PositionSide::Short => close >= self.stop_loss,
        }
    }

    pub fn target_hit(&self, close: f64) -> bool {
        match (self.side, self.take_profit) {
            (PositionSide::Long, Some(tp)) => close >= tp,
            (PositionSide::Short, Some(tp)) => close <= tp,
            (_, None) => false,
        }
    }

    /// Ratchet the trailing stop toward `close`.
    ///
    /// For longs the stop may only go up; for shorts it may only go down.
    /// Returns the new stop if it moved.
    pub fn ratchet_trailing_stop(&mut self, close: f64, distance: f64) -> Option<f64> {
        let mark = match (self.side, self.water_mark) {
            (PositionSide::Long, Some(m)) => m.max(close),
            (PositionSide::Short, Some(m)) => m.min(close),
            (_, None) => close,
        };
        self.water_mark = Some(mark);

        let candidate = match self.side {
            PositionSide::Long => mark * (1.0 - distance),
            PositionSide::Short => mark * (1.0 + distance),
        };
        let tightens = match self.side {
            PositionSide::Long => candidate > self.stop_loss,
            PositionSide::Short => candidate < self.stop_loss,
        };
        if tightens {
            self.stop_loss = candidate;
            Some(candidate)
        } else {
            None
        }
    }
}
