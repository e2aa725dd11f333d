//! Shared calibration pipeline used by the `fit` command.
//!
//! measurement JSON -> SI conversion -> calibrator configuration -> calibrate
//! -> residuals -> worst-measurement ranking
//!
//! The command handler only has to print and export what comes back.

use std::path::PathBuf;
use std::rc::Rc;

use log::info;
use nalgebra::Vector3;

use crate::domain::{CalibrationResult, MeasurementSet};
use crate::error::AppError;
use crate::fit::{Calibrator, CalibratorConfig, CalibratorListener};
use crate::io::read_measurement_file;
use crate::math::FitterOptions;
use crate::report::{MeasurementResidual, compute_residuals, rank_worst};

/// Everything a calibration run needs, already in SI units.
#[derive(Debug, Clone)]
pub struct FitJobConfig {
    pub input: PathBuf,
    pub common_axis: bool,
    /// Overrides the gravity norm stored in the input file (m/s²).
    pub gravity_norm: Option<f64>,
    /// Overrides the bias stored in the input file (m/s²).
    pub bias: Option<Vector3<f64>>,
    pub fitter: FitterOptions,
    pub top_n: usize,
}

/// All computed outputs of a single `accal fit` run.
#[derive(Debug, Clone)]
pub struct FitRunOutput {
    pub measurements: MeasurementSet,
    pub gravity_norm: f64,
    pub bias: Vector3<f64>,
    pub result: CalibrationResult,
    pub residuals: Vec<MeasurementResidual>,
    pub worst: Vec<MeasurementResidual>,
}

/// Logs calibration lifecycle events.
pub struct LogListener;

impl CalibratorListener for LogListener {
    fn on_calibrate_start(&self, calibrator: &Calibrator) {
        info!(
            "calibration started ({} mode, {} measurements)",
            calibrator.axis_mode().display_name(),
            calibrator.measurements().len()
        );
    }

    fn on_calibrate_end(&self, calibrator: &Calibrator) {
        if let Some(chi_sq) = calibrator.estimated_chi_sq() {
            info!("calibration finished (chi_sq={chi_sq:.6e})");
        }
    }
}

/// Execute the full calibration pipeline and return the computed outputs.
pub fn run_fit(config: &FitJobConfig) -> Result<FitRunOutput, AppError> {
    // 1) Load the session.
    let file = read_measurement_file(&config.input)?;
    let measurements = file.measurement_set()?;

    let gravity_norm = config
        .gravity_norm
        .or(file.gravity_norm_si())
        .ok_or_else(|| {
            AppError::new(
                3,
                format!(
                    "No gravity norm in '{}'; pass --gravity.",
                    config.input.display()
                ),
            )
        })?;
    let bias = config.bias.unwrap_or_else(|| file.bias_si());

    // 2) Configure and run the calibrator.
    let calibrator = Calibrator::from_config(CalibratorConfig {
        measurements: measurements.clone(),
        bias,
        common_axis: config.common_axis,
        ground_truth_gravity_norm: Some(gravity_norm),
        fitter: config.fitter.clone(),
        listener: Some(Rc::new(LogListener)),
        ..CalibratorConfig::default()
    })?;
    calibrator.calibrate()?;

    let result = calibrator
        .result()
        .ok_or_else(|| AppError::new(4, "Calibration finished without a result."))?;

    // 3) Residuals and ranking.
    let residuals = compute_residuals(&measurements, &result, &bias, gravity_norm)?;
    let worst = rank_worst(&residuals, config.top_n);

    Ok(FitRunOutput {
        measurements,
        gravity_norm,
        bias,
        result,
        residuals,
        worst,
    })
}
