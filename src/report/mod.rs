//! Reporting utilities: per-measurement residuals, rankings and formatted
//! terminal output.

use nalgebra::Vector3;

use crate::domain::{CalibrationResult, MeasurementSet};
use crate::error::AppError;

pub mod format;

pub use format::*;

/// Post-fit residual of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResidual {
    /// Position of the measurement in the input set.
    pub index: usize,
    /// `||(I + Ma)⁻¹ (fmeas - ba)||` (m/s²).
    pub corrected_norm: f64,
    /// `corrected_norm - g` (m/s²).
    pub residual: f64,
}

/// Correct every measurement with the estimated matrix and compare its norm
/// with the ground-truth gravity norm.
pub fn compute_residuals(
    measurements: &MeasurementSet,
    result: &CalibrationResult,
    bias: &Vector3<f64>,
    gravity_norm: f64,
) -> Result<Vec<MeasurementResidual>, AppError> {
    let mut out = Vec::with_capacity(measurements.len());
    for (index, m) in measurements.iter().enumerate() {
        let corrected = result.correct(m.specific_force(), bias)?;
        let corrected_norm = corrected.norm();
        if !corrected_norm.is_finite() {
            return Err(AppError::new(4, "Non-finite corrected specific force during residual computation."));
        }
        out.push(MeasurementResidual {
            index,
            corrected_norm,
            residual: corrected_norm - gravity_norm,
        });
    }
    Ok(out)
}

/// The `top_n` measurements with the largest absolute residual.
pub fn rank_worst(residuals: &[MeasurementResidual], top_n: usize) -> Vec<MeasurementResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| {
        b.residual
            .abs()
            .partial_cmp(&a.residual.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}

/// Format the worst-residual table.
pub fn format_residuals(rows: &[MeasurementResidual]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:>6} {:>14} {:>14}\n", "index", "|f| corrected", "residual").trim_end());
    out.push('\n');
    out.push_str(format!("{:->6} {:->14} {:->14}\n", "", "", "").trim_end());
    out.push('\n');
    for r in rows {
        out.push_str(&format!(
            "{:>6} {:>14.6} {:>14.3e}\n",
            r.index, r.corrected_norm, r.residual
        ));
    }
    out
}
