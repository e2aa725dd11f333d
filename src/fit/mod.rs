//! Calibration orchestration.
//!
//! - the `Calibrator` state machine and its listener hooks (`calibrator`)
//! - common-axis covariance expansion to the 9×9 layout (`covariance`)

pub mod calibrator;
pub mod covariance;

pub use calibrator::*;
pub use covariance::*;
