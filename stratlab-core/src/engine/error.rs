use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors that abort a backtest run.
///
/// None of these produce a partial result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Validation(String),
    #[error("evaluator '{evaluator}' needs {required} bars, series has {available}")]
    InsufficientData {
        evaluator: String,
        required: usize,
        available: usize,
    },
    #[error("non-finite price data at bar {index} ({timestamp})")]
    DataIntegrity {
        index: usize,
        timestamp: NaiveDateTime,
    },
    #[error("run exceeded its deadline at bar {index}")]
    Timeout { index: usize },
}
