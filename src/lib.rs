//! `accel-cal` library crate.
//!
//! Estimates the scale-factor / cross-coupling matrix `Ma` of an accelerometer
//! whose bias is known, from static readings taken at a position where the
//! gravity norm is known. The binary (`accal`) is a thin wrapper around this
//! library so the calibration core is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
