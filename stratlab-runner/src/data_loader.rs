//! Bar sources for the runner.
//!
//! A [`BarSource`] resolves a symbol and an optional date window to a
//! validated [`PriceSeries`]. Two implementations ship here: an in-memory
//! map for tests and embedding, and a directory of per-symbol CSV files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use stratlab_core::domain::{Bar, PriceSeries, SeriesError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no data for symbol '{0}'")]
    UnknownSymbol(String),

    #[error("no bars for '{symbol}' in the requested window")]
    EmptyWindow { symbol: String },

    #[error("malformed CSV in {path} at record {record}: {source}")]
    Csv {
        path: PathBuf,
        record: usize,
        source: csv::Error,
    },

    #[error("invalid series: {0}")]
    Series(#[from] SeriesError),
}

/// Anything that can produce bars for a symbol.
pub trait BarSource: Send + Sync {
    /// Load bars for `symbol` with timestamps in `[start, end]`. Open bounds
    /// mean "from the first bar" / "to the last bar".
    fn load(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, SourceError>;
}

fn clip(
    series: PriceSeries,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<PriceSeries, SourceError> {
    let clipped = match (start, end) {
        (None, None) => series,
        _ => {
            let from = start.or(series.first_timestamp());
            let to = end.or(series.last_timestamp());
            match (from, to) {
                (Some(from), Some(to)) => series.between(from, to),
                _ => series,
            }
        }
    };
    if clipped.is_empty() {
        return Err(SourceError::EmptyWindow {
            symbol: clipped.symbol().to_string(),
        });
    }
    Ok(clipped)
}

// ─── In-memory ──────────────────────────────────────────────────────

/// Pre-built series keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: BTreeMap<String, PriceSeries>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl BarSource for InMemorySource {
    fn load(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, SourceError> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| SourceError::UnknownSymbol(symbol.to_string()))?;
        clip(series.clone(), start, end)
    }
}

// ─── CSV directory ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: u64,
}

/// Reads `{dir}/{symbol}.csv` with header
/// `timestamp,open,high,low,close,volume`. Timestamps use the
/// `2024-01-02T09:30:00` form.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn read_bars(&self, symbol: &str, path: &Path) -> Result<Vec<Bar>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| SourceError::Csv {
                path: path.to_path_buf(),
                record: 0,
                source,
            })?;

        let mut bars = Vec::new();
        for (record, row) in reader.deserialize::<CsvBar>().enumerate() {
            let row = row.map_err(|source| SourceError::Csv {
                path: path.to_path_buf(),
                record: record + 1,
                source,
            })?;
            bars.push(Bar {
                symbol: symbol.to_string(),
                timestamp: row.timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(bars)
    }
}

impl BarSource for CsvSource {
    fn load(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, SourceError> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(SourceError::UnknownSymbol(symbol.to_string()));
        }
        let bars = self.read_bars(symbol, &path)?;
        tracing::debug!(symbol, path = %path.display(), bars = bars.len(), "loaded csv bars");
        let series = PriceSeries::new(symbol, bars)?;
        clip(series, start, end)
    }
}
