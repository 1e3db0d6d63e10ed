//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity points and/or closed trades in,
//! scalar out. Undefined ratios use fixed sentinels rather than arbitrary
//! caps, see [`PerformanceMetrics`].

use serde::{Deserialize, Serialize};
use stratlab_core::domain::ClosedTrade;
use stratlab_core::engine::BacktestResult;

/// Bars per year used for annualization when none is given.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
///
/// Sentinels:
/// - `profit_factor`: `+inf` when there are profits but no losses, `0` with neither
/// - `sharpe`: `NaN` with fewer than two returns or zero deviation
/// - `sortino`: `+inf` with no downside and a positive mean, otherwise `NaN` when undefined
/// - `calmar`: `+inf` with no drawdown and a positive annualized return, `NaN` with no drawdown otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Sum of losing trade P&L as a positive number.
    pub gross_loss: f64,
    pub total_profit: f64,
    /// Mean P&L of winning trades.
    pub avg_profit: f64,
    /// Mean loss of losing trades, as a positive number.
    pub avg_loss: f64,
    #[serde(with = "crate::serde_float")]
    pub profit_factor: f64,
    pub final_balance: f64,
    /// `(final - initial) / initial` as a fraction.
    pub return_pct: f64,
    /// Largest peak-to-trough decline as a positive fraction of the peak.
    pub max_drawdown: f64,
    #[serde(with = "crate::serde_float")]
    pub sharpe: f64,
    #[serde(with = "crate::serde_float")]
    pub sortino: f64,
    #[serde(with = "crate::serde_float")]
    pub calmar: f64,
    #[serde(with = "crate::serde_float")]
    pub annualized_return: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics for one run.
    pub fn compute(result: &BacktestResult, periods_per_year: f64) -> Self {
        let trades = &result.trades;
        let equity = equity_points(result);
        let returns = period_returns(&equity);
        let max_dd = max_drawdown(&equity);
        let annualized = annualized_return(&equity, periods_per_year);

        let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
        let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count();
        let gross_profit = gross_profit(trades);
        let gross_loss = gross_loss(trades);

        Self {
            trade_count: result.trade_count(),
            winning_trades,
            losing_trades,
            win_rate: win_rate(trades),
            gross_profit,
            gross_loss,
            total_profit: trades.iter().map(|t| t.pnl).sum(),
            avg_profit: if winning_trades > 0 {
                gross_profit / winning_trades as f64
            } else {
                0.0
            },
            avg_loss: if losing_trades > 0 {
                gross_loss / losing_trades as f64
            } else {
                0.0
            },
            profit_factor: profit_factor(trades),
            final_balance: result.final_balance,
            return_pct: total_return(result.initial_balance, result.final_balance),
            max_drawdown: max_dd,
            sharpe: sharpe_ratio(&returns, periods_per_year),
            sortino: sortino_ratio(&returns, periods_per_year),
            calmar: calmar_ratio(annualized, max_dd),
            annualized_return: annualized,
            max_consecutive_wins: max_consecutive(trades, |t| t.pnl > 0.0),
            max_consecutive_losses: max_consecutive(trades, |t| t.pnl < 0.0),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total equity at the start of the run followed by every snapshot.
pub fn equity_points(result: &BacktestResult) -> Vec<f64> {
    std::iter::once(result.initial_balance)
        .chain(result.equity_curve.iter().map(|s| s.total_equity))
        .collect()
}

/// Simple returns between consecutive equity points.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub fn total_return(initial: f64, final_balance: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_balance - initial) / initial
}

/// Compound annualized return over `equity.len() - 1` periods.
///
/// Returns 0.0 when there are no periods, -1.0 when equity is wiped out.
pub fn annualized_return(equity: &[f64], periods_per_year: f64) -> f64 {
    let periods = equity.len().saturating_sub(1);
    if periods == 0 || equity[0] <= 0.0 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let growth = equity[periods] / equity[0];
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(periods_per_year / periods as f64) - 1.0
}

/// Annualized Sharpe ratio: `mean / std * sqrt(periods_per_year)`, risk-free rate 0.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let std = std_dev(returns);
    if std == 0.0 {
        return f64::NAN;
    }
    mean_f64(returns) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio using downside deviation over all periods.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let mean = mean_f64(returns);
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std == 0.0 {
        return if mean > 0.0 { f64::INFINITY } else { f64::NAN };
    }
    mean / downside_std * periods_per_year.sqrt()
}

/// Calmar ratio: annualized return over max drawdown.
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        return if annualized_return > 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        };
    }
    annualized_return / max_drawdown
}

/// Maximum drawdown as a positive fraction (e.g., 0.15 = 15% below the peak).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Win rate: fraction of trades with positive P&L.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn gross_profit(trades: &[ClosedTrade]) -> f64 {
    trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum()
}

pub fn gross_loss(trades: &[ClosedTrade]) -> f64 {
    trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum()
}

/// Profit factor: gross profit / gross loss.
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    let profit = gross_profit(trades);
    let loss = gross_loss(trades);
    if loss == 0.0 {
        return if profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    profit / loss
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[ClosedTrade], pred: impl Fn(&ClosedTrade) -> bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if pred(trade) {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}
