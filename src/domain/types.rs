//! Shared domain types.
//!
//! - static specific-force measurements and the set they are fitted from
//! - axis mode (general vs. common z-axis)
//! - the calibration result bundle and the named coupling parameters

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// One static specific-force reading (m/s²) and its noise standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    specific_force: Vector3<f64>,
    specific_force_std_dev: f64,
}

impl Measurement {
    /// Create a measurement.
    ///
    /// Fails if any component is non-finite or the standard deviation is
    /// negative or non-finite.
    pub fn new(specific_force: Vector3<f64>, specific_force_std_dev: f64) -> Result<Self, CalibrationError> {
        if !specific_force.iter().all(|v| v.is_finite()) {
            return Err(CalibrationError::InvalidInput(format!(
                "specific force must be finite, got [{}, {}, {}]",
                specific_force.x, specific_force.y, specific_force.z
            )));
        }
        if !(specific_force_std_dev.is_finite() && specific_force_std_dev >= 0.0) {
            return Err(CalibrationError::InvalidInput(format!(
                "specific force standard deviation must be finite and >= 0, got {specific_force_std_dev}"
            )));
        }
        Ok(Self {
            specific_force,
            specific_force_std_dev,
        })
    }

    pub fn specific_force(&self) -> &Vector3<f64> {
        &self.specific_force
    }

    pub fn specific_force_std_dev(&self) -> f64 {
        self.specific_force_std_dev
    }
}

/// Measurements captured at a single position, in any order.
///
/// Identical readings are kept as independent observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSet {
    measurements: Vec<Measurement>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.measurements.iter()
    }

    pub fn as_slice(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Build the design matrix (one specific-force row per measurement) and the
    /// matching per-row standard deviations.
    pub fn design(&self) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.measurements.len();
        let mut x = DMatrix::<f64>::zeros(n, 3);
        let mut sigma = DVector::<f64>::zeros(n);
        for (i, m) in self.measurements.iter().enumerate() {
            for j in 0..3 {
                x[(i, j)] = m.specific_force[j];
            }
            sigma[i] = m.specific_force_std_dev;
        }
        (x, sigma)
    }
}

impl From<Vec<Measurement>> for MeasurementSet {
    fn from(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }
}

impl FromIterator<Measurement> for MeasurementSet {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        Self {
            measurements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MeasurementSet {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}

/// Which unknowns of the coupling matrix are estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisMode {
    /// All nine entries of `Ma`.
    General,
    /// Accelerometer z-axis shared with a reference: `myx = mzx = mzy = 0`.
    CommonAxis,
}

impl AxisMode {
    pub fn from_common_axis(common_axis: bool) -> Self {
        if common_axis {
            AxisMode::CommonAxis
        } else {
            AxisMode::General
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AxisMode::General => "general",
            AxisMode::CommonAxis => "common z-axis",
        }
    }

    /// Number of unknowns in the fitted parameter vector.
    pub fn param_len(self) -> usize {
        match self {
            AxisMode::General => 9,
            AxisMode::CommonAxis => 6,
        }
    }

    /// Minimum number of measurements: one more than the number of unknowns.
    pub fn min_measurements(self) -> usize {
        self.param_len() + 1
    }
}

/// Named entries of the coupling matrix, in covariance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CouplingParam {
    Sx,
    Sy,
    Sz,
    Mxy,
    Mxz,
    Myx,
    Myz,
    Mzx,
    Mzy,
}

impl CouplingParam {
    pub const ALL: [CouplingParam; 9] = [
        CouplingParam::Sx,
        CouplingParam::Sy,
        CouplingParam::Sz,
        CouplingParam::Mxy,
        CouplingParam::Mxz,
        CouplingParam::Myx,
        CouplingParam::Myz,
        CouplingParam::Mzx,
        CouplingParam::Mzy,
    ];

    /// Row/column of this parameter in the 9×9 covariance matrix.
    pub fn covariance_index(self) -> usize {
        match self {
            CouplingParam::Sx => 0,
            CouplingParam::Sy => 1,
            CouplingParam::Sz => 2,
            CouplingParam::Mxy => 3,
            CouplingParam::Mxz => 4,
            CouplingParam::Myx => 5,
            CouplingParam::Myz => 6,
            CouplingParam::Mzx => 7,
            CouplingParam::Mzy => 8,
        }
    }

    /// `(row, column)` of this parameter inside `Ma`.
    pub fn matrix_position(self) -> (usize, usize) {
        match self {
            CouplingParam::Sx => (0, 0),
            CouplingParam::Sy => (1, 1),
            CouplingParam::Sz => (2, 2),
            CouplingParam::Mxy => (0, 1),
            CouplingParam::Mxz => (0, 2),
            CouplingParam::Myx => (1, 0),
            CouplingParam::Myz => (1, 2),
            CouplingParam::Mzx => (2, 0),
            CouplingParam::Mzy => (2, 1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CouplingParam::Sx => "sx",
            CouplingParam::Sy => "sy",
            CouplingParam::Sz => "sz",
            CouplingParam::Mxy => "mxy",
            CouplingParam::Mxz => "mxz",
            CouplingParam::Myx => "myx",
            CouplingParam::Myz => "myz",
            CouplingParam::Mzx => "mzx",
            CouplingParam::Mzy => "mzy",
        }
    }
}

/// Outcome of a successful calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub mode: AxisMode,
    /// Estimated scale factors (diagonal) and cross couplings.
    pub estimated_ma: Matrix3<f64>,
    /// 9×9 covariance indexed as `[sx, sy, sz, mxy, mxz, myx, myz, mzx, mzy]`.
    pub covariance: DMatrix<f64>,
    pub chi_sq: f64,
    pub mse: f64,
    /// Solver iterations until convergence.
    pub iterations: usize,
}

impl CalibrationResult {
    /// Estimated value of one named entry of `Ma`.
    pub fn param(&self, param: CouplingParam) -> f64 {
        self.estimated_ma[param.matrix_position()]
    }

    pub fn sx(&self) -> f64 {
        self.param(CouplingParam::Sx)
    }

    pub fn sy(&self) -> f64 {
        self.param(CouplingParam::Sy)
    }

    pub fn sz(&self) -> f64 {
        self.param(CouplingParam::Sz)
    }

    pub fn mxy(&self) -> f64 {
        self.param(CouplingParam::Mxy)
    }

    pub fn mxz(&self) -> f64 {
        self.param(CouplingParam::Mxz)
    }

    pub fn myx(&self) -> f64 {
        self.param(CouplingParam::Myx)
    }

    pub fn myz(&self) -> f64 {
        self.param(CouplingParam::Myz)
    }

    pub fn mzx(&self) -> f64 {
        self.param(CouplingParam::Mzx)
    }

    pub fn mzy(&self) -> f64 {
        self.param(CouplingParam::Mzy)
    }

    /// Variance of one named entry (covariance diagonal).
    pub fn variance(&self, param: CouplingParam) -> f64 {
        let i = param.covariance_index();
        self.covariance[(i, i)]
    }

    pub fn std_dev(&self, param: CouplingParam) -> f64 {
        self.variance(param).max(0.0).sqrt()
    }

    /// Mean standard deviation over the parameters that were actually estimated.
    pub fn average_std_dev(&self) -> f64 {
        let estimated: Vec<f64> = CouplingParam::ALL
            .iter()
            .filter(|p| self.mode == AxisMode::General || !is_suppressed(**p))
            .map(|p| self.std_dev(*p))
            .collect();
        estimated.iter().sum::<f64>() / estimated.len() as f64
    }

    /// Apply the estimated calibration to a raw reading:
    /// `ftrue = (I + Ma)⁻¹ (fmeas - ba)`.
    pub fn correct(&self, measured: &Vector3<f64>, bias: &Vector3<f64>) -> Result<Vector3<f64>, CalibrationError> {
        let m = Matrix3::identity() + self.estimated_ma;
        let m_inv = m.try_inverse().ok_or_else(|| {
            CalibrationError::InvalidInput("estimated coupling matrix is singular".to_string())
        })?;
        Ok(m_inv * (measured - bias))
    }
}

/// Entries forced to zero in common-axis mode.
pub fn is_suppressed(param: CouplingParam) -> bool {
    matches!(
        param,
        CouplingParam::Myx | CouplingParam::Mzx | CouplingParam::Mzy
    )
}
