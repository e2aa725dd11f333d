//! Domain types used throughout the calibration pipeline.
//!
//! This module defines:
//!
//! - static measurements and measurement sets (`Measurement`, `MeasurementSet`)
//! - the axis mode and the named coupling parameters
//! - the calibration result bundle (`CalibrationResult`)
//! - acceleration units (`AccelerationUnit`)

pub mod types;
pub mod units;

pub use types::*;
pub use units::*;
