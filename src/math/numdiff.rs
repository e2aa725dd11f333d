//! Numerical differentiation.
//!
//! The calibration residual is a smooth scalar function of the parameter
//! vector, so a central-difference gradient is accurate enough for the solver
//! and saves us from deriving the Jacobian of `||M⁻¹ (f - b)||²` by hand.

use nalgebra::DVector;

/// Relative step, `cbrt(f64::EPSILON)`. Optimal for central differences.
const STEP_SCALE: f64 = 6.055_454_452_393_343e-6;

/// Estimate the gradient of `f` at `params` with central differences.
///
/// `out` must have the same length as `params`. Any error returned by `f` is
/// propagated unchanged.
pub fn central_gradient<F, E>(mut f: F, params: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), E>
where
    F: FnMut(&DVector<f64>) -> Result<f64, E>,
{
    assert_eq!(
        out.len(),
        params.len(),
        "gradient buffer must match parameter count"
    );

    let mut work = params.clone();
    for j in 0..params.len() {
        let x = params[j];
        let h = STEP_SCALE * x.abs().max(1.0);

        // Use the actually representable spacing as the denominator.
        let x_plus = x + h;
        let x_minus = x - h;

        work[j] = x_plus;
        let f_plus = f(&work)?;
        work[j] = x_minus;
        let f_minus = f(&work)?;
        work[j] = x;

        out[j] = (f_plus - f_minus) / (x_plus - x_minus);
    }

    Ok(())
}
