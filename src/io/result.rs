//! Export calibration results to JSON.
//!
//! The result file records the estimated coupling matrix, the full 9×9
//! covariance, fit statistics and a per-parameter summary, stamped with the
//! UTC time of the export.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, Matrix3};
use serde::{Deserialize, Serialize};

use crate::domain::{AxisMode, CalibrationResult, CouplingParam};
use crate::error::AppError;

/// One named entry of `Ma` with its standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    pub std_dev: f64,
}

/// On-disk calibration result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub mode: AxisMode,
    /// Gravity norm used for the fit (m/s²).
    pub gravity_norm: f64,
    /// Known bias used for the fit (m/s²).
    pub bias: [f64; 3],
    /// Row-major `Ma`.
    pub estimated_ma: [[f64; 3]; 3],
    /// Row-major 9×9 covariance, `[sx, sy, sz, mxy, mxz, myx, myz, mzx, mzy]`.
    pub covariance: Vec<Vec<f64>>,
    pub chi_sq: f64,
    pub mse: f64,
    pub iterations: usize,
    pub params: Vec<ParamEstimate>,
}

impl ResultFile {
    pub fn from_result(result: &CalibrationResult, gravity_norm: f64, bias: [f64; 3]) -> Self {
        let ma = &result.estimated_ma;
        let estimated_ma = [
            [ma[(0, 0)], ma[(0, 1)], ma[(0, 2)]],
            [ma[(1, 0)], ma[(1, 1)], ma[(1, 2)]],
            [ma[(2, 0)], ma[(2, 1)], ma[(2, 2)]],
        ];

        let covariance = result
            .covariance
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();

        let params = CouplingParam::ALL
            .iter()
            .map(|p| ParamEstimate {
                name: p.name().to_string(),
                value: result.param(*p),
                std_dev: result.std_dev(*p),
            })
            .collect();

        Self {
            tool: "accal".to_string(),
            created_at: Utc::now(),
            mode: result.mode,
            gravity_norm,
            bias,
            estimated_ma,
            covariance,
            chi_sq: result.chi_sq,
            mse: result.mse,
            iterations: result.iterations,
            params,
        }
    }

    /// Rebuild the in-memory result from the stored matrix and covariance.
    pub fn to_result(&self) -> Result<CalibrationResult, AppError> {
        if self.covariance.len() != 9 || self.covariance.iter().any(|row| row.len() != 9) {
            return Err(AppError::new(2, "Invalid result JSON: covariance must be 9x9."));
        }
        let ma = &self.estimated_ma;
        Ok(CalibrationResult {
            mode: self.mode,
            estimated_ma: Matrix3::new(
                ma[0][0], ma[0][1], ma[0][2], ma[1][0], ma[1][1], ma[1][2], ma[2][0], ma[2][1], ma[2][2],
            ),
            covariance: DMatrix::from_fn(9, 9, |r, c| self.covariance[r][c]),
            chi_sq: self.chi_sq,
            mse: self.mse,
            iterations: self.iterations,
        })
    }
}

/// Write a calibration result JSON file.
pub fn write_result_json(path: &Path, result: &ResultFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, result)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;
    Ok(())
}

/// Read a calibration result JSON file.
pub fn read_result_json(path: &Path) -> Result<ResultFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open result JSON '{}': {e}", path.display())))?;
    let result: ResultFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid result JSON: {e}")))?;
    Ok(result)
}
