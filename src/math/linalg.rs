//! Small linear-algebra helpers on top of nalgebra.
//!
//! The solver needs two things beyond plain matrix products:
//! - a solve of the damped normal equations at every iteration (LU is enough,
//!   the damped matrix is square and usually well conditioned)
//! - the inverse of the curvature matrix at the solution (the parameter
//!   covariance), which may be rank deficient when the model is only identified
//!   up to a rotation. We use an SVD pseudo-inverse for that one.

use nalgebra::{DMatrix, DVector};

/// Relative singular-value cutoffs, tried from strictest to loosest.
const PINV_TOLERANCES: [f64; 3] = [1e-15, 1e-12, 1e-9];

/// Solve a square system with LU decomposition.
///
/// Returns `None` if the matrix is singular or the solution is not finite.
pub fn solve_square(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let x = a.lu().solve(b)?;
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Moore-Penrose pseudo-inverse of a symmetric positive semi-definite matrix.
///
/// The cutoff is relative to the largest singular value so that the result does
/// not depend on the scale of the weights.
pub fn pseudo_inverse(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !a.iter().all(|v| v.is_finite()) {
        return None;
    }

    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    if !(max_sv.is_finite() && max_sv > 0.0) {
        return None;
    }

    for &tol in &PINV_TOLERANCES {
        if let Ok(inv) = svd.clone().pseudo_inverse(tol * max_sv) {
            if inv.iter().all(|v| v.is_finite()) {
                return Some(inv);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_square_matches_known_solution() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);

        let x = solve_square(a, &b).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn solve_square_rejects_singular_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 1.0]);
        assert!(solve_square(a, &b).is_none());
    }

    #[test]
    fn pseudo_inverse_equals_inverse_for_full_rank() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let pinv = pseudo_inverse(&a).unwrap();
        let inv = a.clone().try_inverse().unwrap();
        for (p, q) in pinv.iter().zip(inv.iter()) {
            assert!((p - q).abs() < 1e-10);
        }
    }

    #[test]
    fn pseudo_inverse_handles_rank_deficient_matrix() {
        // Rank one: v v^T with v = [1, 1].
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let pinv = pseudo_inverse(&a).unwrap();
        for v in pinv.iter() {
            assert!((v - 0.25).abs() < 1e-10);
        }
    }
}
