//! Position sizing, margin checks and realized P&L.

use crate::domain::{Position, PositionSide};

use super::config::MarginPolicy;
use super::result::SkipReason;

/// Round `value` to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// Realized P&L of closing `position` at `exit_price`, rounded to `decimals`.
pub fn realized_pnl(position: &Position, exit_price: f64, decimals: u32) -> f64 {
    round_to(position.unrealized_pnl(exit_price), decimals)
}

/// Fixed-fractional sizing: risk `balance * risk_per_trade` over the stop distance.
pub fn size_position(
    side: PositionSide,
    balance: f64,
    risk_per_trade: f64,
    entry: f64,
    stop: f64,
) -> Result<f64, SkipReason> {
    let distance = (entry - stop).abs();
    if !distance.is_finite() || distance == 0.0 {
        return Err(SkipReason::ZeroRiskDistance);
    }
    let wrong_side = match side {
        PositionSide::Long => stop >= entry,
        PositionSide::Short => stop <= entry,
    };
    if wrong_side {
        return Err(SkipReason::InvalidStop);
    }
    let quantity = balance * risk_per_trade / distance;
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(SkipReason::NonPositiveQuantity);
    }
    Ok(quantity)
}

/// Outcome of checking a sized entry against the margin policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginDecision {
    Accept(f64),
    Clamped { requested: f64, granted: f64 },
    Rejected,
}

/// Check `quantity` at `entry` against the margin left after `open_notional`.
pub fn apply_margin(
    policy: MarginPolicy,
    balance: f64,
    open_notional: f64,
    quantity: f64,
    entry: f64,
) -> MarginDecision {
    let leverage = match policy {
        MarginPolicy::Unlimited => return MarginDecision::Accept(quantity),
        MarginPolicy::Reject { leverage } | MarginPolicy::Clamp { leverage } => leverage,
    };
    let available = balance * leverage - open_notional;
    if quantity * entry <= available {
        return MarginDecision::Accept(quantity);
    }
    match policy {
        MarginPolicy::Clamp { .. } if available > 0.0 => MarginDecision::Clamped {
            requested: quantity,
            granted: available / entry,
        },
        _ => MarginDecision::Rejected,
    }
}
