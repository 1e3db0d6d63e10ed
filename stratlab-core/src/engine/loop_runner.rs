//! Bar-by-bar simulation loop.
//!
//! Per bar, strictly in this order:
//! 0. Integrity and deadline checks
//! 1. Exits for every open position (stop, target, trailing update, max hold)
//! 2. Entry evaluation once warmup has passed and a slot is free
//! 3. Mark-to-market snapshot
//!
//! Positions still open after the last bar are closed at its close.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::{Bar, ExitReason, ParameterSet, Position, PositionSide, PriceSeries};
use crate::signal::{Signal, SignalAction, SignalEvaluator};

use super::accounting::{apply_margin, size_position, MarginDecision};
use super::config::{EngineConfig, ExitPolicy};
use super::error::EngineError;
use super::result::{BacktestResult, MarginClamp, SkipReason};
use super::state::RunContext;

/// External controls for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunControl {
    deadline: Option<Instant>,
}

impl RunControl {
    /// No deadline.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// Deadline `timeout` from now, or unbounded when `None`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Run one backtest.
///
/// The result is a pure function of `(series, params, evaluator, config)`;
/// `control` can only abort the run.
pub fn run_backtest(
    series: &PriceSeries,
    params: &ParameterSet,
    evaluator: &dyn SignalEvaluator,
    config: &EngineConfig,
    control: &RunControl,
) -> Result<BacktestResult, EngineError> {
    // ── Pre-flight ──
    config.validate()?;
    let exits = ExitPolicy::resolve(config, params)?;
    let min_window = evaluator.min_window(params).max(1);
    if series.len() < min_window {
        return Err(EngineError::InsufficientData {
            evaluator: evaluator.name().to_string(),
            required: min_window,
            available: series.len(),
        });
    }
    let warmup = min_window - 1;

    let mut ctx = RunContext::new(config.initial_balance, config.pnl_decimals, series.len());
    ctx.metadata.evaluator = evaluator.name().to_string();
    ctx.metadata.params_fingerprint = params.fingerprint();
    ctx.metadata.warmup_bars = warmup;

    debug!(
        symbol = series.symbol(),
        evaluator = evaluator.name(),
        params = %params,
        bars = series.len(),
        "backtest started"
    );

    let bars = series.bars();
    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_finite() {
            return Err(EngineError::DataIntegrity {
                index: i,
                timestamp: bar.timestamp,
            });
        }
        if control.expired() {
            return Err(EngineError::Timeout { index: i });
        }

        // ── Exits ──
        let mut slot = 0;
        while slot < ctx.open.len() {
            match check_exit(&mut ctx.open[slot], bar, &exits) {
                Some(reason) => ctx.close_position(slot, bar, i, reason),
                None => slot += 1,
            }
        }

        // ── Entries ──
        if i >= warmup && ctx.open.len() < config.max_positions {
            let signal = match evaluator.evaluate(series.window(i), params) {
                Ok(s) => s,
                Err(e) => {
                    warn!(evaluator = evaluator.name(), bar = i, error = %e, "evaluator failed, holding");
                    ctx.metadata.evaluator_failures += 1;
                    Signal::hold()
                }
            };
            if signal.is_entry() {
                ctx.metadata.signals_seen += 1;
                try_enter(&mut ctx, &signal, bar, i, config);
            }
        }

        // ── Mark-to-market ──
        ctx.snapshot(bar);
        ctx.metadata.bars_processed += 1;
    }

    // ── End of data ──
    if !ctx.open.is_empty() {
        if let Some(last) = bars.last() {
            let last_index = bars.len() - 1;
            while !ctx.open.is_empty() {
                ctx.close_position(0, last, last_index, ExitReason::EndOfData);
            }
            ctx.snapshot(last);
        }
    }

    debug!(
        symbol = series.symbol(),
        trades = ctx.trades.len(),
        final_balance = ctx.balance,
        "backtest finished"
    );

    Ok(BacktestResult {
        symbol: series.symbol().to_string(),
        params: params.clone(),
        initial_balance: config.initial_balance,
        final_balance: ctx.balance,
        trades: ctx.trades,
        equity_curve: ctx.equity_curve,
        metadata: ctx.metadata,
    })
}

/// Evaluate exit rules for one position in priority order.
///
/// The trailing stop is ratcheted here but only triggers from the next bar.
fn check_exit(position: &mut Position, bar: &Bar, exits: &ExitPolicy) -> Option<ExitReason> {
    if position.stop_hit(bar.close) {
        return Some(ExitReason::StopLoss);
    }
    if position.target_hit(bar.close) {
        return Some(ExitReason::TakeProfit);
    }
    if let Some(distance) = exits.trailing_distance {
        position.ratchet_trailing_stop(bar.close, distance);
    }
    match exits.max_hold {
        Some(limit) if bar.timestamp - position.entry_time > limit => {
            Some(ExitReason::MaxHoldTime)
        }
        _ => None,
    }
}

fn try_enter(ctx: &mut RunContext, signal: &Signal, bar: &Bar, index: usize, config: &EngineConfig) {
    let side = match signal.action {
        SignalAction::Buy => PositionSide::Long,
        SignalAction::Sell => PositionSide::Short,
        SignalAction::Hold => return,
    };
    let entry = bar.close;
    let stop = signal.stop_loss.unwrap_or(match side {
        PositionSide::Long => entry * (1.0 - config.default_stop_pct),
        PositionSide::Short => entry * (1.0 + config.default_stop_pct),
    });

    let requested = match size_position(side, ctx.balance, config.risk_per_trade, entry, stop) {
        Ok(q) => q,
        Err(reason) => {
            debug!(bar = index, ?reason, "entry skipped");
            ctx.metadata.record_skip(reason);
            return;
        }
    };

    let quantity = match apply_margin(
        config.margin_policy,
        ctx.balance,
        ctx.open_notional(),
        requested,
        entry,
    ) {
        MarginDecision::Accept(q) => q,
        MarginDecision::Clamped { requested, granted } => {
            warn!(bar = index, requested, granted, "entry quantity clamped to available margin");
            ctx.metadata.margin_clamps.push(MarginClamp {
                bar_index: index,
                timestamp: bar.timestamp,
                requested_quantity: requested,
                granted_quantity: granted,
            });
            granted
        }
        MarginDecision::Rejected => {
            debug!(bar = index, requested, "entry rejected by margin policy");
            ctx.metadata.record_skip(SkipReason::MarginRejected);
            return;
        }
    };

    ctx.open.push(Position {
        symbol: bar.symbol.clone(),
        side,
        entry_time: bar.timestamp,
        entry_bar: index,
        entry_price: entry,
        quantity,
        stop_loss: stop,
        take_profit: signal.take_profit,
        water_mark: None,
        signal_score: signal.score,
    });
    ctx.metadata.entries_opened += 1;
}
