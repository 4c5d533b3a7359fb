//! Unit conversion for display and derived metrics.
//!
//! Only kW and MW convert into each other. Biogas flow (Nm3/h) is a different
//! physical quantity and has no conversion to or from power.

use crate::telemetry::PowerUnit;

const KW_PER_MW: f64 = 1000.0;

/// Compact cars at 100 km/h per MW, used on the map popup.
pub const CARS_PER_MW_100_KMH: f64 = 67.0;
/// Cars at 80 km/h per MW (10.12 MW = 264 cars), used on the embed page.
pub const CARS_PER_MW_80_KMH: f64 = 264.0 / 10.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("cannot convert {from} to {to}")]
    Incompatible { from: PowerUnit, to: PowerUnit },
}

pub fn normalize(value: f64, from: PowerUnit, to: PowerUnit) -> Result<f64, UnitError> {
    match (from, to) {
        (from, to) if from == to => Ok(value),
        (PowerUnit::Kw, PowerUnit::Mw) => Ok(value / KW_PER_MW),
        (PowerUnit::Mw, PowerUnit::Kw) => Ok(value * KW_PER_MW),
        (from, to) => Err(UnitError::Incompatible { from, to }),
    }
}

pub fn to_megawatts(value: f64, unit: PowerUnit) -> Option<f64> {
    normalize(value, unit, PowerUnit::Mw).ok()
}

/// Rounded car count equivalent to a power value. `None` for flow units and
/// for zero, negative or non-finite power.
pub fn cars_equivalent(value: f64, unit: PowerUnit, cars_per_mw: f64) -> Option<i64> {
    let mw = to_megawatts(value, unit)?;
    if !mw.is_finite() || mw <= 0.0 {
        return None;
    }
    Some((mw * cars_per_mw).round() as i64)
}
