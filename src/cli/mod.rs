//! Command-line parsing for the accelerometer calibrator.
//!
//! Argument parsing and command dispatch stay separate from the estimation
//! code; `app` turns these structs into library calls.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::AccelerationUnit;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "accal",
    version,
    about = "Accelerometer scale-factor / cross-coupling calibration with known bias and gravity norm"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a synthetic static measurement session and write it as JSON.
    Simulate(SimulateArgs),
    /// Calibrate from a measurement JSON file, print the report and optionally export.
    Fit(FitArgs),
    /// Print a previously exported calibration result.
    Show(ShowArgs),
}

/// Options for synthetic session generation.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Number of static measurements.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub count: usize,

    /// Random seed for orientations and noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Local gravity norm, in `--unit`.
    #[arg(short = 'g', long, default_value_t = 9.81, allow_negative_numbers = true)]
    pub gravity: f64,

    /// Accelerometer bias (BX BY BZ), in `--unit`.
    #[arg(
        long,
        num_args = 3,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [0.0, 0.0, 0.0]
    )]
    pub bias: Vec<f64>,

    /// Coupling matrix Ma, 9 values in row-major order.
    #[arg(
        long,
        num_args = 9,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [0.0; 9]
    )]
    pub ma: Vec<f64>,

    /// Gaussian noise standard deviation added to every axis (0 disables noise), in `--unit`.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Standard deviation recorded for each measurement when `--noise` is 0, in `--unit`.
    #[arg(long, default_value_t = 0.01)]
    pub std_dev: f64,

    /// Unit of gravity, bias and noise arguments, and of the written file.
    #[arg(long, value_enum, default_value_t = AccelerationUnit::MetersPerSquaredSecond)]
    pub unit: AccelerationUnit,

    /// Output measurement JSON file.
    #[arg(short = 'o', long, value_name = "JSON")]
    pub output: PathBuf,
}

/// Options for a calibration run.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Measurement JSON file (see `accal simulate`).
    #[arg(short = 'i', long, value_name = "JSON")]
    pub input: PathBuf,

    /// Assume the accelerometer z-axis is the common axis (upper-triangular Ma).
    #[arg(long)]
    pub common_axis: bool,

    /// Override the gravity norm stored in the file, in `--unit`.
    #[arg(short = 'g', long, allow_negative_numbers = true)]
    pub gravity: Option<f64>,

    /// Unit of `--gravity` / `--bias` and of the echoed gravity norm.
    #[arg(long, value_enum, default_value_t = AccelerationUnit::MetersPerSquaredSecond)]
    pub unit: AccelerationUnit,

    /// Override the bias stored in the file (BX BY BZ), in `--unit`.
    #[arg(long, num_args = 3, value_delimiter = ',', allow_negative_numbers = true)]
    pub bias: Option<Vec<f64>>,

    /// Maximum solver iterations.
    #[arg(long, default_value_t = 5000)]
    pub max_iterations: usize,

    /// Solver convergence tolerance on chi-square changes.
    #[arg(long, default_value_t = 1e-3)]
    pub tolerance: f64,

    /// Show the N measurements with the largest post-fit residual.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Print the full 9x9 covariance matrix.
    #[arg(long)]
    pub covariance: bool,

    /// Export the calibration result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

/// Options for printing a saved result.
#[derive(Debug, Parser, Clone)]
pub struct ShowArgs {
    /// Result JSON file produced by `accal fit --export`.
    #[arg(long, value_name = "JSON")]
    pub result: PathBuf,

    /// Print the full 9x9 covariance matrix.
    #[arg(long)]
    pub covariance: bool,
}
