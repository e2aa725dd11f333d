//! Error types.
//!
//! - `FitError`: failures raised by the nonlinear least-squares solver and the
//!   per-row evaluators it drives.
//! - `CalibrationError`: the library-facing taxonomy returned by the calibrator.
//! - `AppError`: what the `accal` binary reports (message + process exit code).

use thiserror::Error;

/// Numerical failure inside the solver or one of its evaluators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Singular or otherwise non-invertible matrix.
    #[error("algebra error: {0}")]
    Algebra(String),
    /// The convergence criterion was not met within the iteration budget.
    #[error("solver did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
    /// Inputs handed to the solver are inconsistent (dimensions, sigmas, ...).
    #[error("invalid solver input: {0}")]
    InvalidInput(String),
}

/// Errors returned by the calibrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// A calibration run is in progress; configuration and new runs are rejected.
    #[error("calibrator is locked while a calibration is running")]
    Locked,
    /// Preconditions for `calibrate()` are not met.
    #[error("calibrator is not ready: {0}")]
    NotReady(String),
    /// A setter or constructor received an invalid value.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Numerical failure while fitting.
    #[error("calibration failed: {0}")]
    Calibration(#[from] FitError),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<CalibrationError> for AppError {
    fn from(err: CalibrationError) -> Self {
        let exit_code = match err {
            CalibrationError::InvalidInput(_) => 2,
            CalibrationError::NotReady(_) => 3,
            CalibrationError::Calibration(_) => 4,
            CalibrationError::Locked => 5,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_errors_map_to_exit_codes() {
        let locked: AppError = CalibrationError::Locked.into();
        assert_eq!(locked.exit_code(), 5);

        let not_ready: AppError = CalibrationError::NotReady("no measurements".into()).into();
        assert_eq!(not_ready.exit_code(), 3);
        assert!(not_ready.to_string().contains("no measurements"));

        let failed: AppError =
            CalibrationError::from(FitError::NotConverged { iterations: 10 }).into();
        assert_eq!(failed.exit_code(), 4);
        assert!(failed.to_string().contains("10 iterations"));
    }
}
