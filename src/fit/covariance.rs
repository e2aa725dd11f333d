//! Covariance remapping for the common-axis parameterization.
//!
//! The common-axis fit estimates six entries of the upper-triangular `M`
//! (`[m11, m12, m22, m13, m23, m33]`). Downstream consumers always expect a
//! 9×9 covariance indexed as `[sx, sy, sz, mxy, mxz, myx, myz, mzx, mzy]`, so
//! the 6×6 covariance is propagated through a fixed 9×6 selection Jacobian:
//!
//! ```text
//! Cov₉ = J · Cov₆ · Jᵀ
//! ```
//!
//! `M = I + Ma` is a constant shift, so `∂Ma/∂M` is the identity on each
//! estimated slot. `myx`, `mzx` and `mzy` were not estimated and get zero
//! variance and zero covariance with everything else.

use nalgebra::DMatrix;

use crate::domain::{AxisMode, CouplingParam};

/// Covariance slot receiving each packed common-axis parameter.
const COMMON_AXIS_SLOTS: [CouplingParam; 6] = [
    CouplingParam::Sx,  // m11
    CouplingParam::Mxy, // m12
    CouplingParam::Sy,  // m22
    CouplingParam::Mxz, // m13
    CouplingParam::Myz, // m23
    CouplingParam::Sz,  // m33
];

/// The 9×6 Jacobian mapping common-axis parameters to general slots.
pub fn common_axis_jacobian() -> DMatrix<f64> {
    let mut j = DMatrix::<f64>::zeros(9, AxisMode::CommonAxis.param_len());
    for (col, slot) in COMMON_AXIS_SLOTS.iter().enumerate() {
        j[(slot.covariance_index(), col)] = 1.0;
    }
    j
}

/// Expand a 6×6 common-axis covariance into the 9×9 general layout.
///
/// # Panics
/// Panics if `cov` is not 6×6.
pub fn expand_common_axis_covariance(cov: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(
        cov.shape(),
        (6, 6),
        "common-axis covariance must be 6x6"
    );
    let j = common_axis_jacobian();
    &j * cov * j.transpose()
}
