//! Domain types for StratLab

pub mod bar;
pub mod equity;
pub mod params;
pub mod position;
pub mod series;
pub mod trade;

pub use bar::Bar;
pub use equity::EquitySnapshot;
pub use params::{ParamValue, ParameterSet};
pub use position::{Position, PositionSide};
pub use series::{PriceSeries, SeriesError};
pub use trade::{ClosedTrade, ExitReason};
