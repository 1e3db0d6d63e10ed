//! Objective registry: which metric an optimizer maximizes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::PerformanceMetrics;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown objective '{0}' (expected one of: sharpe_ratio, sortino_ratio, calmar_ratio, profit_factor, total_profit, win_rate)")]
pub struct UnknownObjective(pub String);

/// Metric to maximize. Higher is always better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    ProfitFactor,
    TotalProfit,
    WinRate,
}

impl Objective {
    pub const ALL: [Objective; 6] = [
        Self::SharpeRatio,
        Self::SortinoRatio,
        Self::CalmarRatio,
        Self::ProfitFactor,
        Self::TotalProfit,
        Self::WinRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SharpeRatio => "sharpe_ratio",
            Self::SortinoRatio => "sortino_ratio",
            Self::CalmarRatio => "calmar_ratio",
            Self::ProfitFactor => "profit_factor",
            Self::TotalProfit => "total_profit",
            Self::WinRate => "win_rate",
        }
    }

    /// Raw metric value, sentinels included.
    pub fn extract(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::SharpeRatio => metrics.sharpe,
            Self::SortinoRatio => metrics.sortino,
            Self::CalmarRatio => metrics.calmar,
            Self::ProfitFactor => metrics.profit_factor,
            Self::TotalProfit => metrics.total_profit,
            Self::WinRate => metrics.win_rate,
        }
    }

    /// Totally ordered score: NaN maps to [`Objective::worst`].
    pub fn score(&self, metrics: &PerformanceMetrics) -> f64 {
        let v = self.extract(metrics);
        if v.is_nan() {
            self.worst()
        } else {
            v
        }
    }

    /// Score given to failed or undefined evaluations.
    pub fn worst(&self) -> f64 {
        f64::NEG_INFINITY
    }

    /// Returns true if score `a` is strictly better than `b`.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = UnknownObjective;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.name() == s)
            .ok_or_else(|| UnknownObjective(s.to_string()))
    }
}
