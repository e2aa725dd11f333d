//! Accelerometer measurement model.
//!
//! Physical relationship for a static reading:
//!
//! ```text
//! fmeas = ba + (I + Ma) ftrue
//! ```
//!
//! With `M = I + Ma` and `b = M⁻¹ ba` this is `fmeas = M (ftrue + b)`, so the
//! true specific force recovered from a candidate `M` is
//!
//! ```text
//! ftrue_est = M⁻¹ fmeas - b
//! ```
//!
//! At a static pose `||ftrue|| = g`, hence the fitter drives
//! `||ftrue_est||²` towards `g²` for every reading.
//!
//! The fitter works on a packed parameter vector; the layouts below define how
//! entries of `M` are packed for each axis mode.

use nalgebra::{DVector, Matrix3, Vector3};

use crate::domain::AxisMode;
use crate::error::FitError;
use crate::math::{MultiDimensionEvaluator, central_gradient};

/// Entries of `M` in general mode, ordered like the covariance:
/// `[sx, sy, sz, mxy, mxz, myx, myz, mzx, mzy]`.
const GENERAL_LAYOUT: [(usize, usize); 9] = [
    (0, 0),
    (1, 1),
    (2, 2),
    (0, 1),
    (0, 2),
    (1, 0),
    (1, 2),
    (2, 0),
    (2, 1),
];

/// Upper-triangular entries of `M`, column-major:
/// `[m11, m12, m22, m13, m23, m33]`.
const COMMON_AXIS_LAYOUT: [(usize, usize); 6] = [(0, 0), (0, 1), (1, 1), (0, 2), (1, 2), (2, 2)];

/// Positions of the packed parameters inside `M` for the given mode.
pub fn param_layout(mode: AxisMode) -> &'static [(usize, usize)] {
    match mode {
        AxisMode::General => &GENERAL_LAYOUT,
        AxisMode::CommonAxis => &COMMON_AXIS_LAYOUT,
    }
}

/// Pack `M` into the parameter vector for `mode`.
///
/// In common-axis mode the sub-diagonal entries of `m` are dropped.
pub fn pack_params(mode: AxisMode, m: &Matrix3<f64>) -> DVector<f64> {
    let layout = param_layout(mode);
    DVector::from_iterator(layout.len(), layout.iter().map(|&pos| m[pos]))
}

/// Unpack a parameter vector into `M`; entries not in the layout are zero.
///
/// # Panics
/// Panics if `params` does not have length `mode.param_len()`.
pub fn unpack_params(mode: AxisMode, params: &DVector<f64>) -> Matrix3<f64> {
    let layout = param_layout(mode);
    assert_eq!(
        params.len(),
        layout.len(),
        "parameter vector length does not match {} layout",
        mode.display_name()
    );

    let mut m = Matrix3::zeros();
    for (value, &pos) in params.iter().zip(layout) {
        m[pos] = *value;
    }
    m
}

/// Squared norm of the true specific force implied by `m` for one reading.
///
/// Fails with an algebra error when `m` cannot be inverted.
pub fn predict_norm_squared(
    m: &Matrix3<f64>,
    bias: &Vector3<f64>,
    measured: &Vector3<f64>,
) -> Result<f64, FitError> {
    let m_inv = m
        .try_inverse()
        .ok_or_else(|| FitError::Algebra("coupling matrix M = I + Ma is singular".to_string()))?;
    let b = m_inv * bias;
    let f_true = m_inv * measured - b;
    Ok(f_true.norm_squared())
}

/// Forward model: the reading produced by true specific force `f_true`.
pub fn forward(ma: &Matrix3<f64>, bias: &Vector3<f64>, f_true: &Vector3<f64>) -> Vector3<f64> {
    bias + (Matrix3::identity() + ma) * f_true
}

/// Per-row evaluator handed to the least-squares fitter.
///
/// Each design row is a measured specific force; the model value is
/// `||ftrue_est||²` and its gradient is taken numerically.
#[derive(Debug, Clone)]
pub struct GravityNormEvaluator {
    mode: AxisMode,
    bias: Vector3<f64>,
}

impl GravityNormEvaluator {
    pub fn new(mode: AxisMode, bias: Vector3<f64>) -> Self {
        Self { mode, bias }
    }

    fn value(&self, params: &DVector<f64>, measured: &Vector3<f64>) -> Result<f64, FitError> {
        let m = unpack_params(self.mode, params);
        predict_norm_squared(&m, &self.bias, measured)
    }
}

impl MultiDimensionEvaluator for GravityNormEvaluator {
    fn evaluate(
        &mut self,
        point: &DVector<f64>,
        params: &DVector<f64>,
        gradient: &mut DVector<f64>,
    ) -> Result<f64, FitError> {
        if point.len() != 3 {
            return Err(FitError::InvalidInput(format!(
                "design rows must have 3 components, got {}",
                point.len()
            )));
        }
        let measured = Vector3::new(point[0], point[1], point[2]);

        central_gradient(|p| self.value(p, &measured), params, gradient)?;
        self.value(params, &measured)
    }
}
