//! Mutable state owned by one backtest run.

use crate::domain::{Bar, ClosedTrade, EquitySnapshot, ExitReason, Position};

use super::accounting::realized_pnl;
use super::result::RunMetadata;

/// Everything a run mutates. Created per run, never shared.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub balance: f64,
    /// Open positions in the order they were opened.
    pub open: Vec<Position>,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub metadata: RunMetadata,
    pnl_decimals: u32,
}

impl RunContext {
    pub fn new(initial_balance: f64, pnl_decimals: u32, capacity: usize) -> Self {
        Self {
            balance: initial_balance,
            open: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(capacity + 1),
            metadata: RunMetadata::default(),
            pnl_decimals,
        }
    }

    pub fn open_notional(&self) -> f64 {
        self.open.iter().map(Position::notional).sum()
    }

    pub fn unrealized_pnl(&self, close: f64) -> f64 {
        self.open.iter().map(|p| p.unrealized_pnl(close)).sum()
    }

    /// Close the open position at `slot` at the bar's close.
    pub fn close_position(&mut self, slot: usize, bar: &Bar, bar_index: usize, reason: ExitReason) {
        let position = self.open.remove(slot);
        let pnl = realized_pnl(&position, bar.close, self.pnl_decimals);
        self.balance += pnl;
        self.trades.push(ClosedTrade::from_position(
            position,
            bar.timestamp,
            bar_index,
            bar.close,
            reason,
            pnl,
        ));
    }

    /// Append a mark-to-market snapshot at the bar's close.
    pub fn snapshot(&mut self, bar: &Bar) {
        let unrealized = self.unrealized_pnl(bar.close);
        self.equity_curve
            .push(EquitySnapshot::new(bar.timestamp, self.balance, unrealized));
    }
}
