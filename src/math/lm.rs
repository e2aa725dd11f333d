//! Levenberg-Marquardt fitter for multi-dimensional design rows.
//!
//! Problem shape:
//!
//! ```text
//! minimize χ²(a) = Σ_i ((y_i - ŷ(x_i; a)) / σ_i)²
//! ```
//!
//! where every `x_i` is a row of the design matrix and `ŷ` is supplied by a
//! [`MultiDimensionEvaluator`] together with its gradient with respect to `a`.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (α + λ diag(α)) δ = β,   α = Σ ∇ŷ ∇ŷᵀ / σ²,   β = Σ (y - ŷ) ∇ŷ / σ²
//! ```
//!
//! and accepts the step only if χ² decreases (λ shrinks by 10), otherwise λ
//! grows by 10. The fit is considered converged once χ² has changed by less
//! than `max(tol, tol·χ²)` on `CONVERGED_STREAK` iterations.

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::math::linalg::{pseudo_inverse, solve_square};

/// Number of small-χ²-change iterations required to declare convergence.
const CONVERGED_STREAK: usize = 4;

/// Supplies the model value and its parameter gradient for one design row.
pub trait MultiDimensionEvaluator {
    /// Evaluate the model at `point` (one design-matrix row) for `params`.
    ///
    /// Must fill `gradient` (same length as `params`) with `∂ŷ/∂a` and return
    /// `ŷ`.
    fn evaluate(
        &mut self,
        point: &DVector<f64>,
        params: &DVector<f64>,
        gradient: &mut DVector<f64>,
    ) -> Result<f64, FitError>;
}

/// Solver tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct FitterOptions {
    /// Maximum number of LM iterations before giving up.
    pub max_iterations: usize,
    /// Convergence tolerance on χ² changes.
    pub tolerance: f64,
    /// Starting damping factor.
    pub initial_lambda: f64,
}

impl Default for FitterOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-3,
            initial_lambda: 1e-3,
        }
    }
}

impl FitterOptions {
    /// Check that the options describe a usable solver.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(format!("tolerance must be finite and > 0, got {}", self.tolerance));
        }
        if !(self.initial_lambda.is_finite() && self.initial_lambda > 0.0) {
            return Err(format!(
                "initial_lambda must be finite and > 0, got {}",
                self.initial_lambda
            ));
        }
        Ok(())
    }
}

/// Raw solver output.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub params: DVector<f64>,
    /// Parameter covariance, `α⁻¹` at the solution.
    pub covariance: DMatrix<f64>,
    pub chi_sq: f64,
    /// Mean of the unweighted squared residuals.
    pub mse: f64,
    pub iterations: usize,
}

/// Levenberg-Marquardt least-squares fitter.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardtFitter {
    options: FitterOptions,
}

/// Curvature matrix, gradient vector and fit statistics at one parameter point.
struct Curvature {
    alpha: DMatrix<f64>,
    beta: DVector<f64>,
    chi_sq: f64,
    mse: f64,
}

impl LevenbergMarquardtFitter {
    pub fn new(options: FitterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FitterOptions {
        &self.options
    }

    /// Fit `params` so that the evaluator reproduces `y` at the rows of `x`.
    pub fn fit<E>(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        sigma: &DVector<f64>,
        initial: &DVector<f64>,
        evaluator: &mut E,
    ) -> Result<FitOutput, FitError>
    where
        E: MultiDimensionEvaluator + ?Sized,
    {
        self.options.validate().map_err(FitError::InvalidInput)?;
        validate_inputs(x, y, sigma, initial)?;

        let n_params = initial.len();
        let tol = self.options.tolerance;

        let mut params = initial.clone();
        let mut current = curvature(x, y, sigma, &params, evaluator)?;
        let mut lambda = self.options.initial_lambda;
        let mut streak = 0usize;

        for iteration in 0..self.options.max_iterations {
            let mut damped = current.alpha.clone();
            for j in 0..n_params {
                damped[(j, j)] *= 1.0 + lambda;
            }
            let step = solve_square(damped, &current.beta).ok_or_else(|| {
                FitError::Algebra("damped normal equations are singular".to_string())
            })?;

            let trial_params = &params + &step;
            let trial = curvature(x, y, sigma, &trial_params, evaluator)?;

            trace!(
                "lm iteration {iteration}: chi_sq={:.6e} trial={:.6e} lambda={lambda:.3e}",
                current.chi_sq,
                trial.chi_sq
            );

            if (trial.chi_sq - current.chi_sq).abs() < tol.max(tol * trial.chi_sq) {
                streak += 1;
            }

            if trial.chi_sq < current.chi_sq {
                lambda *= 0.1;
                params = trial_params;
                current = trial;
            } else {
                lambda *= 10.0;
            }

            // Tested after every update, the last allowed iteration included.
            if streak >= CONVERGED_STREAK {
                let covariance = pseudo_inverse(&current.alpha).ok_or_else(|| {
                    FitError::Algebra("curvature matrix could not be inverted".to_string())
                })?;
                return Ok(FitOutput {
                    params,
                    covariance,
                    chi_sq: current.chi_sq,
                    mse: current.mse,
                    iterations: iteration + 1,
                });
            }
        }

        Err(FitError::NotConverged {
            iterations: self.options.max_iterations,
        })
    }
}

fn validate_inputs(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    sigma: &DVector<f64>,
    initial: &DVector<f64>,
) -> Result<(), FitError> {
    let n = x.nrows();
    if n == 0 {
        return Err(FitError::InvalidInput("design matrix has no rows".to_string()));
    }
    if y.len() != n || sigma.len() != n {
        return Err(FitError::InvalidInput(format!(
            "row count mismatch: x={n}, y={}, sigma={}",
            y.len(),
            sigma.len()
        )));
    }
    if initial.is_empty() {
        return Err(FitError::InvalidInput("no parameters to fit".to_string()));
    }
    if let Some(s) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(FitError::InvalidInput(format!(
            "standard deviations must be finite and > 0, got {s}"
        )));
    }
    if !x.iter().chain(y.iter()).chain(initial.iter()).all(|v| v.is_finite()) {
        return Err(FitError::InvalidInput("non-finite value in fit inputs".to_string()));
    }
    Ok(())
}

fn curvature<E>(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    sigma: &DVector<f64>,
    params: &DVector<f64>,
    evaluator: &mut E,
) -> Result<Curvature, FitError>
where
    E: MultiDimensionEvaluator + ?Sized,
{
    let n = x.nrows();
    let p = params.len();

    let mut alpha = DMatrix::<f64>::zeros(p, p);
    let mut beta = DVector::<f64>::zeros(p);
    let mut gradient = DVector::<f64>::zeros(p);
    let mut chi_sq = 0.0;
    let mut sse = 0.0;

    for i in 0..n {
        let point = x.row(i).transpose();
        let y_model = evaluator.evaluate(&point, params, &mut gradient)?;

        let inv_var = 1.0 / (sigma[i] * sigma[i]);
        let dy = y[i] - y_model;

        for j in 0..p {
            let wt = gradient[j] * inv_var;
            for k in 0..=j {
                alpha[(j, k)] += wt * gradient[k];
            }
            beta[j] += dy * wt;
        }

        chi_sq += dy * dy * inv_var;
        sse += dy * dy;
    }

    // Mirror the lower triangle.
    for j in 1..p {
        for k in 0..j {
            alpha[(k, j)] = alpha[(j, k)];
        }
    }

    Ok(Curvature {
        alpha,
        beta,
        chi_sq,
        mse: sse / n as f64,
    })
}
