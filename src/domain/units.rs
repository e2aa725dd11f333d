//! Acceleration units.
//!
//! The estimation core works in m/s² only. Gravity norms, biases and raw
//! specific-force readings given in other units are converted at the edge.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²), ISO 80000-3.
pub const STANDARD_GRAVITY: f64 = 9.806_65;

/// Meters per international foot.
const METERS_PER_FOOT: f64 = 0.3048;

/// Unit of an acceleration (or specific-force) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationUnit {
    /// Meters per squared second (internal unit).
    #[default]
    #[serde(rename = "m/s2")]
    #[value(name = "ms2")]
    MetersPerSquaredSecond,
    /// Multiples of standard gravity.
    #[serde(rename = "g")]
    #[value(name = "g")]
    Gravity,
    /// Feet per squared second.
    #[serde(rename = "ft/s2")]
    #[value(name = "fts2")]
    FeetPerSquaredSecond,
}

impl AccelerationUnit {
    /// Factor that converts a value in this unit to m/s².
    pub fn to_si_factor(self) -> f64 {
        match self {
            AccelerationUnit::MetersPerSquaredSecond => 1.0,
            AccelerationUnit::Gravity => STANDARD_GRAVITY,
            AccelerationUnit::FeetPerSquaredSecond => METERS_PER_FOOT,
        }
    }

    /// Convert `value` in this unit to m/s².
    pub fn to_si(self, value: f64) -> f64 {
        value * self.to_si_factor()
    }

    /// Convert `value` in m/s² to this unit.
    pub fn from_si(self, value: f64) -> f64 {
        value / self.to_si_factor()
    }

    /// Short label for reports.
    pub fn symbol(self) -> &'static str {
        match self {
            AccelerationUnit::MetersPerSquaredSecond => "m/s²",
            AccelerationUnit::Gravity => "g",
            AccelerationUnit::FeetPerSquaredSecond => "ft/s²",
        }
    }
}
