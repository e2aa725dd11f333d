//! Synthetic static measurements from the forward model.
//!
//! Each sample draws a uniformly distributed orientation, sets the true
//! specific force to `g · u` (static pose, `||ftrue|| = g`), and produces the
//! reading `fmeas = ba + (I + Ma) ftrue`, optionally perturbed with Gaussian
//! noise. Generation is seeded and therefore reproducible.

use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, UnitSphere};

use crate::domain::{Measurement, MeasurementSet};
use crate::error::CalibrationError;
use crate::models::forward;

/// Parameters of a synthetic measurement run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub count: usize,
    pub seed: u64,
    /// Local gravity norm (m/s²).
    pub gravity_norm: f64,
    pub bias: Vector3<f64>,
    pub ma: Matrix3<f64>,
    /// Standard deviation attached to every measurement (m/s²).
    pub std_dev: f64,
    /// Whether to actually add Gaussian noise of `std_dev` to the readings.
    pub noisy: bool,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            count: 20,
            seed: 42,
            gravity_norm: 9.81,
            bias: Vector3::zeros(),
            ma: Matrix3::zeros(),
            std_dev: 0.01,
            noisy: false,
        }
    }
}

/// Generate a measurement set according to `config`.
pub fn generate_measurements(config: &SampleConfig) -> Result<MeasurementSet, CalibrationError> {
    if config.count == 0 {
        return Err(CalibrationError::InvalidInput("sample count must be > 0".to_string()));
    }
    if !(config.gravity_norm.is_finite() && config.gravity_norm >= 0.0) {
        return Err(CalibrationError::InvalidInput(format!(
            "gravity norm must be finite and >= 0, got {}",
            config.gravity_norm
        )));
    }
    if !(config.std_dev.is_finite() && config.std_dev > 0.0) {
        return Err(CalibrationError::InvalidInput(format!(
            "standard deviation must be finite and > 0, got {}",
            config.std_dev
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, config.std_dev)
        .map_err(|e| CalibrationError::InvalidInput(format!("noise distribution error: {e}")))?;

    let mut set = MeasurementSet::new();
    for _ in 0..config.count {
        let u: [f64; 3] = UnitSphere.sample(&mut rng);
        let f_true = Vector3::from(u) * config.gravity_norm;

        let mut measured = forward(&config.ma, &config.bias, &f_true);
        if config.noisy {
            for v in measured.iter_mut() {
                *v += noise.sample(&mut rng);
            }
        }

        set.push(Measurement::new(measured, config.std_dev)?);
    }

    Ok(set)
}
