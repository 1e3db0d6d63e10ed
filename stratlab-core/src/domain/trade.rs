//! ClosedTrade: the terminal snapshot of a position.

use super::position::{Position, PositionSide};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHoldTime,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::MaxHoldTime => "max_hold_time",
            Self::EndOfData => "end_of_data",
        }
    }
}

/// A completed round-trip trade: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    // ── Identification ──
    pub symbol: String,
    pub side: PositionSide,

    // ── Entry ──
    pub entry_time: NaiveDateTime,
    pub entry_bar: usize,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_time: NaiveDateTime,
    pub exit_bar: usize,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size & levels at exit ──
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub water_mark: Option<f64>,
    pub signal_score: f64,

    // ── PnL ──
    /// Realized PnL, rounded at the realization boundary.
    pub pnl: f64,
}

impl ClosedTrade {
    /// Snapshot `position` as closed at `exit_price`.
    pub fn from_position(
        position: Position,
        exit_time: NaiveDateTime,
        exit_bar: usize,
        exit_price: f64,
        exit_reason: ExitReason,
        pnl: f64,
    ) -> Self {
        Self {
            symbol: position.symbol,
            side: position.side,
            entry_time: position.entry_time,
            entry_bar: position.entry_bar,
            entry_price: position.entry_price,
            exit_time,
            exit_bar,
            exit_price,
            exit_reason,
            quantity: position.quantity,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            water_mark: position.water_mark,
            signal_score: position.signal_score,
            pnl,
        }
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    /// Return on the trade as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.quantity == 0.0 {
            return 0.0;
        }
        self.pnl / (self.entry_price * self.quantity)
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
