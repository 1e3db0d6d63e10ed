//! Export: JSON reports and CSV traces for auditing.
//!
//! - **JSON**: full round-trip of `BacktestReport` and `OptimizationReport`
//! - **CSV**: trade tape, equity curve, optimizer evaluation trace and
//!   per-generation statistics
//!
//! Non-finite scores are written as `NaN`, `inf` or `-inf` in both formats.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use stratlab_core::domain::{ClosedTrade, EquitySnapshot};

use crate::genetic::GenerationStats;
use crate::optimize::OptimizationReport;
use crate::runner::{BacktestReport, Evaluation, EvaluationOutcome};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV writer: {0}")]
    Flush(String),
    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn backtest_to_json(report: &BacktestReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn backtest_from_json(json: &str) -> Result<BacktestReport, ExportError> {
    Ok(serde_json::from_str(json)?)
}

pub fn optimization_to_json(report: &OptimizationReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn optimization_from_json(json: &str) -> Result<OptimizationReport, ExportError> {
    Ok(serde_json::from_str(json)?)
}

// ─── CSV ────────────────────────────────────────────────────────────

fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{v}")
    }
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(data)?)
}

/// Columns: symbol, side, entry_time, entry_bar, entry_price, exit_time,
/// exit_bar, exit_price, exit_reason, quantity, stop_loss, take_profit, pnl
pub fn trades_csv(trades: &[ClosedTrade]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "side",
        "entry_time",
        "entry_bar",
        "entry_price",
        "exit_time",
        "exit_bar",
        "exit_price",
        "exit_reason",
        "quantity",
        "stop_loss",
        "take_profit",
        "pnl",
    ])?;
    for t in trades {
        wtr.write_record([
            t.symbol.clone(),
            format!("{:?}", t.side).to_lowercase(),
            t.entry_time.to_string(),
            t.entry_bar.to_string(),
            format!("{:.6}", t.entry_price),
            t.exit_time.to_string(),
            t.exit_bar.to_string(),
            format!("{:.6}", t.exit_price),
            t.exit_reason.as_str().to_string(),
            format!("{:.6}", t.quantity),
            format!("{:.6}", t.stop_loss),
            t.take_profit.map(|v| format!("{v:.6}")).unwrap_or_default(),
            format!("{:.2}", t.pnl),
        ])?;
    }
    finish(wtr)
}

pub fn equity_csv(curve: &[EquitySnapshot]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "balance", "unrealized_pnl", "total_equity"])?;
    for s in curve {
        wtr.write_record([
            s.timestamp.to_string(),
            format!("{:.2}", s.balance),
            format!("{:.2}", s.unrealized_pnl),
            format!("{:.2}", s.total_equity),
        ])?;
    }
    finish(wtr)
}

/// One row per evaluation: index, status, score, one column per parameter
/// (union across rows, name order), headline metrics, failure reason.
pub fn evaluations_csv(evaluations: &[Evaluation]) -> Result<String, ExportError> {
    let names: BTreeSet<&str> = evaluations
        .iter()
        .flat_map(|e| e.params.iter().map(|(k, _)| k.as_str()))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header: Vec<String> = vec!["index".into(), "status".into(), "score".into()];
    header.extend(names.iter().map(|n| n.to_string()));
    header.extend(
        ["trade_count", "total_profit", "sharpe", "max_drawdown", "win_rate", "reason"]
            .map(String::from),
    );
    wtr.write_record(&header)?;

    for (i, e) in evaluations.iter().enumerate() {
        let status = match &e.outcome {
            EvaluationOutcome::Success { .. } => "success",
            EvaluationOutcome::Failed { .. } => "failed",
            EvaluationOutcome::Cancelled => "cancelled",
        };
        let mut row = vec![i.to_string(), status.to_string(), fmt_float(e.score)];
        row.extend(
            names
                .iter()
                .map(|n| e.params.get(n).map(ToString::to_string).unwrap_or_default()),
        );
        match &e.outcome {
            EvaluationOutcome::Success { metrics } => row.extend([
                metrics.trade_count.to_string(),
                format!("{:.2}", metrics.total_profit),
                fmt_float(metrics.sharpe),
                format!("{:.6}", metrics.max_drawdown),
                format!("{:.4}", metrics.win_rate),
                String::new(),
            ]),
            EvaluationOutcome::Failed { reason } => {
                row.extend(std::iter::repeat(String::new()).take(5));
                row.push(reason.clone());
            }
            EvaluationOutcome::Cancelled => {
                row.extend(std::iter::repeat(String::new()).take(6));
            }
        }
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

pub fn generations_csv(generations: &[GenerationStats]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "generation",
        "best",
        "mean",
        "min",
        "max",
        "successes",
        "failures",
        "evaluated",
    ])?;
    for g in generations {
        wtr.write_record([
            g.generation.to_string(),
            fmt_float(g.best),
            fmt_float(g.mean),
            fmt_float(g.min),
            fmt_float(g.max),
            g.successes.to_string(),
            g.failures.to_string(),
            g.evaluated.to_string(),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

fn write(path: PathBuf, contents: &str) -> Result<(), ExportError> {
    std::fs::write(&path, contents).map_err(|source| ExportError::Io { path, source })
}

fn ensure_dir(dir: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write `report.json`, `trades.csv` and `equity.csv` into `dir`.
pub fn save_backtest(report: &BacktestReport, dir: &Path) -> Result<(), ExportError> {
    ensure_dir(dir)?;
    write(dir.join("report.json"), &backtest_to_json(report)?)?;
    write(dir.join("trades.csv"), &trades_csv(&report.result.trades)?)?;
    write(dir.join("equity.csv"), &equity_csv(&report.result.equity_curve)?)?;
    Ok(())
}

/// Write `optimization.json` plus `evaluations.csv` or `generations.csv` into `dir`.
pub fn save_optimization(report: &OptimizationReport, dir: &Path) -> Result<(), ExportError> {
    ensure_dir(dir)?;
    write(dir.join("optimization.json"), &optimization_to_json(report)?)?;
    if !report.evaluations.is_empty() {
        write(dir.join("evaluations.csv"), &evaluations_csv(&report.evaluations)?)?;
    }
    if !report.generations.is_empty() {
        write(dir.join("generations.csv"), &generations_csv(&report.generations)?)?;
    }
    Ok(())
}
