//! PriceSeries: an ordered, read-only sequence of bars for one symbol.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::Bar;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar {index} belongs to '{found}', expected '{expected}'")]
    SymbolMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("timestamps must be strictly increasing: bar {index} at {timestamp} does not follow {previous}")]
    NonIncreasing {
        index: usize,
        previous: NaiveDateTime,
        timestamp: NaiveDateTime,
    },
}

/// Ordered bar history for a single symbol.
///
/// The series is never mutated by the engine; optimizers share one instance by
/// reference across every concurrent evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, checking symbol consistency and timestamp ordering.
    ///
    /// Non-finite prices are deliberately not rejected here: they surface as a
    /// data integrity error when a run reaches the offending bar.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        let symbol = symbol.into();
        for (index, bar) in bars.iter().enumerate() {
            if bar.symbol != symbol {
                return Err(SeriesError::SymbolMismatch {
                    index,
                    expected: symbol,
                    found: bar.symbol.clone(),
                });
            }
            if index > 0 {
                let previous = bars[index - 1].timestamp;
                if bar.timestamp <= previous {
                    return Err(SeriesError::NonIncreasing {
                        index,
                        previous,
                        timestamp: bar.timestamp,
                    });
                }
            }
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// History visible at bar `index`: `bars[0..=index]`. Never includes later bars.
    pub fn window(&self, index: usize) -> &[Bar] {
        let end = (index + 1).min(self.bars.len());
        &self.bars[..end]
    }

    /// Sub-series with timestamps in `[start, end]` (both inclusive).
    pub fn between(&self, start: NaiveDateTime, end: NaiveDateTime) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect();
        PriceSeries {
            symbol: self.symbol.clone(),
            bars,
        }
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.timestamp)
    }
}
