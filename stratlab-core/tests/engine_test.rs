//! Integration tests for the backtesting engine.
//!
//! Tests:
//! 1. Sizing and take-profit arithmetic on a hand-checked trade
//! 2. Position cap and exits-before-entries ordering
//! 3. Margin policies (reject, clamp) and skip accounting
//! 4. Short positions
//! 5. Determinism: identical inputs serialize identically
//! 6. Lookahead: evaluators never see bars past the current one

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Mutex;
use stratlab_core::domain::{Bar, ExitReason, ParamValue, ParameterSet, PositionSide, PriceSeries};
use stratlab_core::engine::{
    run_backtest, EngineConfig, EngineError, MarginPolicy, RunControl, SkipReason,
};
use stratlab_core::signal::{EvaluatorError, MomentumEvaluator, Signal, SignalEvaluator};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn series(closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            symbol: "AAPL".into(),
            timestamp: t0() + Duration::minutes(i as i64 * 15),
            open: c,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 1_000,
        })
        .collect();
    PriceSeries::new("AAPL", bars).unwrap()
}

/// Emits a fixed signal at chosen bar indices, hold elsewhere.
struct Scripted {
    at: BTreeMap<usize, Signal>,
}

impl Scripted {
    fn new(entries: Vec<(usize, Signal)>) -> Self {
        Self {
            at: entries.into_iter().collect(),
        }
    }
}

impl SignalEvaluator for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn min_window(&self, _params: &ParameterSet) -> usize {
        1
    }

    fn evaluate(&self, window: &[Bar], _params: &ParameterSet) -> Result<Signal, EvaluatorError> {
        Ok(self
            .at
            .get(&(window.len() - 1))
            .cloned()
            .unwrap_or_else(Signal::hold))
    }
}

fn run(closes: &[f64], ev: &dyn SignalEvaluator, config: &EngineConfig) -> stratlab_core::BacktestResult {
    run_backtest(
        &series(closes),
        &ParameterSet::new(),
        ev,
        config,
        &RunControl::unbounded(),
    )
    .unwrap()
}

// ── 1. Sizing ────────────────────────────────────────────────────────

#[test]
fn fixed_fractional_sizing_and_take_profit() {
    init_tracing();
    let ev = Scripted::new(vec![(0, Signal::buy(80.0, Some(149.0), Some(152.0)))]);
    let result = run(&[150.0, 150.5, 151.2, 152.0, 151.0], &ev, &EngineConfig::default());

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.quantity, 2000.0);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.pnl, 4000.0);
    assert_eq!(result.final_balance, 104_000.0);
    assert_eq!(result.metadata.entries_opened, 1);
}

#[test]
fn missing_stop_uses_default_stop_pct() {
    let ev = Scripted::new(vec![(0, Signal::buy(80.0, None, None))]);
    let result = run(&[100.0, 99.0, 97.0], &ev, &EngineConfig::default());
    let trade = &result.trades[0];
    assert_eq!(trade.stop_loss, 100.0 * (1.0 - 0.02));
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 97.0);
}

// ── 2. Position cap and ordering ─────────────────────────────────────

#[test]
fn max_positions_caps_open_slots() {
    let ev = Scripted::new(
        (0..5)
            .map(|i| (i, Signal::buy(50.0, Some(50.0), None)))
            .collect(),
    );
    let config = EngineConfig {
        max_positions: 2,
        ..EngineConfig::default()
    };
    let result = run(&[100.0; 5], &ev, &config);

    // two slots filled on bars 0 and 1; later signals are not evaluated
    assert_eq!(result.metadata.entries_opened, 2);
    assert_eq!(result.metadata.signals_seen, 2);
    assert_eq!(result.trades.len(), 2);
    assert!(result
        .trades
        .iter()
        .all(|t| t.exit_reason == ExitReason::EndOfData));
}

#[test]
fn exit_frees_slot_for_same_bar_entry() {
    let ev = Scripted::new(vec![
        (0, Signal::buy(50.0, Some(99.0), Some(101.0))),
        (1, Signal::buy(50.0, Some(100.0), None)),
    ]);
    let result = run(&[100.0, 101.0, 101.0], &ev, &EngineConfig::default());

    assert_eq!(result.metadata.entries_opened, 2);
    assert_eq!(result.trades[0].exit_reason, ExitReason::TakeProfit);
    assert_eq!(result.trades[0].exit_bar, 1);
    assert_eq!(result.trades[1].entry_bar, 1);
}

#[test]
fn closed_trades_match_positions_opened() {
    let ev = Scripted::new(vec![
        (0, Signal::buy(50.0, Some(98.0), Some(103.0))),
        (3, Signal::sell(50.0, Some(105.0), Some(100.0))),
        (6, Signal::buy(50.0, Some(90.0), None)),
    ]);
    let closes = [100.0, 101.0, 103.5, 104.0, 102.0, 99.0, 98.0, 99.5];
    let result = run(&closes, &ev, &EngineConfig::default());
    assert_eq!(result.trades.len(), result.metadata.entries_opened);
    assert_eq!(result.trades.len(), 3);
}

// ── 3. Margin ────────────────────────────────────────────────────────

#[test]
fn reject_policy_skips_oversized_entries() {
    let ev = Scripted::new(vec![(0, Signal::buy(80.0, Some(149.0), Some(152.0)))]);
    let config = EngineConfig {
        margin_policy: MarginPolicy::Reject { leverage: 1.0 },
        ..EngineConfig::default()
    };
    let result = run(&[150.0, 152.0], &ev, &config);
    assert!(result.trades.is_empty());
    assert_eq!(
        result.metadata.entries_skipped.get(&SkipReason::MarginRejected),
        Some(&1)
    );
    assert_eq!(result.final_balance, 100_000.0);
}

#[test]
fn clamp_policy_records_the_reduction() {
    let ev = Scripted::new(vec![(0, Signal::buy(80.0, Some(149.0), Some(152.0)))]);
    let config = EngineConfig {
        margin_policy: MarginPolicy::Clamp { leverage: 1.5 },
        ..EngineConfig::default()
    };
    let result = run(&[150.0, 152.0], &ev, &config);

    assert_eq!(result.metadata.margin_clamps.len(), 1);
    let clamp = &result.metadata.margin_clamps[0];
    assert_eq!(clamp.requested_quantity, 2000.0);
    assert_eq!(clamp.granted_quantity, 1000.0);
    assert_eq!(result.trades[0].quantity, 1000.0);
    assert_eq!(result.trades[0].pnl, 2000.0);
}

#[test]
fn wrong_side_stop_is_skipped() {
    let ev = Scripted::new(vec![(0, Signal::buy(80.0, Some(151.0), None))]);
    let result = run(&[150.0, 151.0], &ev, &EngineConfig::default());
    assert!(result.trades.is_empty());
    assert_eq!(result.metadata.total_skipped(), 1);
    assert_eq!(
        result.metadata.entries_skipped.get(&SkipReason::InvalidStop),
        Some(&1)
    );
}

// ── 4. Shorts ────────────────────────────────────────────────────────

#[test]
fn short_position_profits_on_decline() {
    let ev = Scripted::new(vec![(0, Signal::sell(70.0, Some(102.0), Some(96.0)))]);
    let result = run(&[100.0, 98.0, 95.5], &ev, &EngineConfig::default());
    let trade = &result.trades[0];
    assert_eq!(trade.side, PositionSide::Short);
    assert_eq!(trade.quantity, 1000.0);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.pnl, 4500.0);
}

#[test]
fn equity_identity_and_timestamp_order() {
    let ev = Scripted::new(vec![(1, Signal::buy(50.0, Some(95.0), None))]);
    let result = run(&[100.0, 100.0, 103.0, 99.0, 101.0], &ev, &EngineConfig::default());
    for snap in &result.equity_curve {
        assert_eq!(snap.total_equity, snap.balance + snap.unrealized_pnl);
    }
    assert!(result
        .equity_curve
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(result.equity_curve[2].unrealized_pnl, 1_200.0);
}

// ── 5. Determinism ───────────────────────────────────────────────────

#[test]
fn identical_inputs_serialize_identically() {
    let closes: Vec<f64> = (0..300)
        .map(|i| 100.0 + (i as f64 * 0.37).sin() * 2.0 + i as f64 * 0.01)
        .collect();
    let s = series(&closes);
    let params = ParameterSet::new()
        .with("lookback", ParamValue::Int(8))
        .with("entry_threshold", ParamValue::Float(40.0))
        .with("use_trailing_stop", ParamValue::Choice("true".into()));
    let config = EngineConfig {
        max_positions: 3,
        ..EngineConfig::default()
    };

    let a = run_backtest(&s, &params, &MomentumEvaluator, &config, &RunControl::unbounded()).unwrap();
    let b = run_backtest(&s, &params, &MomentumEvaluator, &config, &RunControl::unbounded()).unwrap();
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
    assert!(!a.trades.is_empty());
}

#[test]
fn invalid_config_fails_fast() {
    let err = run_backtest(
        &series(&[100.0, 101.0]),
        &ParameterSet::new(),
        &MomentumEvaluator,
        &EngineConfig::new(100_000.0, 2.0, 1),
        &RunControl::unbounded(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// ── 6. Lookahead ─────────────────────────────────────────────────────

/// Records the last timestamp of every window it receives.
struct Recorder {
    seen: Mutex<Vec<(usize, NaiveDateTime)>>,
}

impl SignalEvaluator for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn min_window(&self, _params: &ParameterSet) -> usize {
        3
    }

    fn evaluate(&self, window: &[Bar], _params: &ParameterSet) -> Result<Signal, EvaluatorError> {
        let last = window.last().map(|b| b.timestamp).unwrap_or_default();
        self.seen.lock().unwrap().push((window.len(), last));
        Ok(Signal::hold())
    }
}

#[test]
fn evaluator_sees_only_past_and_current_bars() {
    let ev = Recorder {
        seen: Mutex::new(Vec::new()),
    };
    let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    run_backtest(&s, &ParameterSet::new(), &ev, &EngineConfig::default(), &RunControl::unbounded())
        .unwrap();

    let seen = ev.seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    for (len, last) in seen {
        assert_eq!(last, s.bars()[len - 1].timestamp);
    }
}
