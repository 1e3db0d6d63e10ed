//! Engine configuration and the per-run exit policy.

use crate::domain::ParameterSet;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Trailing distance used when `use_trailing_stop` is on but no distance is given.
pub const DEFAULT_TRAILING_DISTANCE: f64 = 0.005;

/// How new entries are checked against available margin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MarginPolicy {
    /// No margin check.
    #[default]
    Unlimited,
    /// Skip entries whose notional would exceed `balance * leverage`.
    Reject { leverage: f64 },
    /// Shrink the quantity to fit within `balance * leverage`.
    Clamp { leverage: f64 },
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_balance: f64,
    /// Fraction of the current balance risked per trade, in (0, 1].
    pub risk_per_trade: f64,
    pub max_positions: usize,
    pub margin_policy: MarginPolicy,
    /// Stop distance (fraction of close) used when a signal omits its stop.
    pub default_stop_pct: f64,
    /// Trailing stop distance as a fraction of the water mark.
    pub trailing_stop: Option<f64>,
    #[serde(with = "opt_duration_secs")]
    pub max_hold: Option<Duration>,
    /// Decimal places kept on realized P&L.
    pub pnl_decimals: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100_000.0,
            risk_per_trade: 0.02,
            max_positions: 1,
            margin_policy: MarginPolicy::Unlimited,
            default_stop_pct: 0.02,
            trailing_stop: None,
            max_hold: None,
            pnl_decimals: 2,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_balance: f64, risk_per_trade: f64, max_positions: usize) -> Self {
        Self {
            initial_balance,
            risk_per_trade,
            max_positions,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(EngineError::Validation(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(EngineError::Validation(format!(
                "risk_per_trade must be in (0, 1], got {}",
                self.risk_per_trade
            )));
        }
        if self.max_positions == 0 {
            return Err(EngineError::Validation(
                "max_positions must be at least 1".into(),
            ));
        }
        if !(self.default_stop_pct > 0.0 && self.default_stop_pct < 1.0) {
            return Err(EngineError::Validation(format!(
                "default_stop_pct must be in (0, 1), got {}",
                self.default_stop_pct
            )));
        }
        if let Some(d) = self.trailing_stop {
            if !(d > 0.0 && d < 1.0) {
                return Err(EngineError::Validation(format!(
                    "trailing_stop must be in (0, 1), got {d}"
                )));
            }
        }
        if let Some(h) = self.max_hold {
            if h <= Duration::zero() {
                return Err(EngineError::Validation(
                    "max_hold must be a positive duration".into(),
                ));
            }
        }
        match self.margin_policy {
            MarginPolicy::Reject { leverage } | MarginPolicy::Clamp { leverage }
                if !(leverage.is_finite() && leverage > 0.0) =>
            {
                Err(EngineError::Validation(format!(
                    "margin leverage must be positive, got {leverage}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Exit rules resolved for one run from the config and the parameter set.
///
/// Parameter overrides win over config values:
/// - `use_trailing_stop` switches trailing on or off
/// - `trailing_stop_distance` sets the distance
/// - `max_hold_hours` sets the maximum holding time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPolicy {
    pub trailing_distance: Option<f64>,
    pub max_hold: Option<Duration>,
}

impl ExitPolicy {
    pub fn resolve(config: &EngineConfig, params: &ParameterSet) -> Result<Self, EngineError> {
        let distance = params.get_f64("trailing_stop_distance");
        let trailing_distance = match params.get_bool("use_trailing_stop") {
            Some(false) => None,
            Some(true) => Some(
                distance
                    .or(config.trailing_stop)
                    .unwrap_or(DEFAULT_TRAILING_DISTANCE),
            ),
            None => distance.or(config.trailing_stop),
        };
        if let Some(d) = trailing_distance {
            if !(d > 0.0 && d < 1.0) {
                return Err(EngineError::Validation(format!(
                    "trailing stop distance must be in (0, 1), got {d}"
                )));
            }
        }

        let max_hold = match params.get_f64("max_hold_hours") {
            Some(hours) if hours.is_finite() && hours > 0.0 => Some(hold_from_hours(hours)?),
            Some(hours) => {
                return Err(EngineError::Validation(format!(
                    "max_hold_hours must be positive, got {hours}"
                )))
            }
            None => config.max_hold,
        };

        Ok(Self {
            trailing_distance,
            max_hold,
        })
    }
}

/// `hours` as a whole-second duration. Rejects values chrono cannot hold.
fn hold_from_hours(hours: f64) -> Result<Duration, EngineError> {
    // `as` saturates, so anything past i64 lands on i64::MAX and fails below.
    Duration::try_seconds((hours * 3600.0).round() as i64)
        .filter(|d| *d > Duration::zero())
        .ok_or_else(|| {
            EngineError::Validation(format!(
                "max_hold_hours must be a representable positive duration, got {hours}"
            ))
        })
}

/// Serializes `Option<Duration>` as whole seconds.
mod opt_duration_secs {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.num_seconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<i64>::deserialize(d)? {
            Some(secs) => Duration::try_seconds(secs)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("max_hold of {secs}s is out of range"))),
            None => Ok(None),
        }
    }
}
