//! Calibration orchestration.
//!
//! `Calibrator` owns the configuration (known bias, ground-truth gravity norm,
//! measurements, initial guess, axis mode, solver options, listener) and runs
//! the fit:
//!
//! 1. build the design matrix (one specific force per row), the target vector
//!    (`g²` everywhere) and the per-row standard deviations
//! 2. pack `I + Ma_initial` for the selected axis mode
//! 3. drive the Levenberg-Marquardt fitter with the gravity-norm evaluator
//! 4. unpack `M`, recover `Ma = M - I`, keep covariance / χ² / mse as returned
//! 5. in common-axis mode, expand the covariance to the 9×9 general layout
//!
//! All methods take `&self`. The calibrator is single-threaded; state lives in
//! `Cell`/`RefCell` so that listener callbacks, which receive `&Calibrator`, can
//! inspect it, and so that any re-entrant call made while a run is active
//! (another `calibrate()` or a setter) fails with `CalibrationError::Locked`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::domain::{AccelerationUnit, AxisMode, CalibrationResult, CouplingParam, MeasurementSet};
use crate::error::{CalibrationError, FitError};
use crate::fit::covariance::expand_common_axis_covariance;
use crate::math::{FitterOptions, LevenbergMarquardtFitter};
use crate::models::{GravityNormEvaluator, pack_params, unpack_params};

/// Receives calibration lifecycle notifications on the calling thread.
pub trait CalibratorListener {
    /// Called once the run has started (the calibrator is locked).
    fn on_calibrate_start(&self, _calibrator: &Calibrator) {}

    /// Called after a successful run, once the new result is available.
    fn on_calibrate_end(&self, _calibrator: &Calibrator) {}
}

/// Complete calibrator configuration.
///
/// Every field is validated by `Calibrator::from_config` with the same rules
/// as the matching setter.
#[derive(Clone)]
pub struct CalibratorConfig {
    pub measurements: MeasurementSet,
    /// Known accelerometer bias (m/s²).
    pub bias: Vector3<f64>,
    /// Initial guess for `Ma`.
    pub initial_ma: Matrix3<f64>,
    pub common_axis: bool,
    /// Ground-truth gravity norm at the measurement position (m/s²).
    pub ground_truth_gravity_norm: Option<f64>,
    pub fitter: FitterOptions,
    pub listener: Option<Rc<dyn CalibratorListener>>,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            measurements: MeasurementSet::new(),
            bias: Vector3::zeros(),
            initial_ma: Matrix3::zeros(),
            common_axis: false,
            ground_truth_gravity_norm: None,
            fitter: FitterOptions::default(),
            listener: None,
        }
    }
}

impl std::fmt::Debug for CalibratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibratorConfig")
            .field("measurements", &self.measurements.len())
            .field("bias", &self.bias)
            .field("initial_ma", &self.initial_ma)
            .field("common_axis", &self.common_axis)
            .field("ground_truth_gravity_norm", &self.ground_truth_gravity_norm)
            .field("fitter", &self.fitter)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// Estimates the scale-factor / cross-coupling matrix `Ma` of an accelerometer
/// with known bias from static readings at a position of known gravity norm.
#[derive(Debug, Default)]
pub struct Calibrator {
    config: RefCell<CalibratorConfig>,
    result: RefCell<Option<CalibrationResult>>,
    running: Cell<bool>,
}

/// Sets the running flag for its lifetime.
struct RunningGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Snapshot of everything a single fit needs.
struct FitJob {
    mode: AxisMode,
    measurements: MeasurementSet,
    bias: Vector3<f64>,
    initial_ma: Matrix3<f64>,
    gravity_norm: f64,
    fitter: FitterOptions,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a calibrator from a full configuration, validating every field.
    pub fn from_config(config: CalibratorConfig) -> Result<Self, CalibrationError> {
        validate_vector("bias", &config.bias)?;
        validate_matrix("initial Ma", &config.initial_ma)?;
        if let Some(g) = config.ground_truth_gravity_norm {
            validate_gravity_norm(g)?;
        }
        config.fitter.validate().map_err(CalibrationError::InvalidInput)?;

        Ok(Self {
            config: RefCell::new(config),
            result: RefCell::new(None),
            running: Cell::new(false),
        })
    }

    // ---------------------------------------------------------------------
    // State queries
    // ---------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn axis_mode(&self) -> AxisMode {
        AxisMode::from_common_axis(self.config.borrow().common_axis)
    }

    pub fn is_common_axis_used(&self) -> bool {
        self.config.borrow().common_axis
    }

    /// Minimum number of measurements for the current axis mode.
    pub fn minimum_required_measurements(&self) -> usize {
        self.axis_mode().min_measurements()
    }

    /// Whether `calibrate()` would pass its precondition checks.
    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    pub fn measurements(&self) -> MeasurementSet {
        self.config.borrow().measurements.clone()
    }

    pub fn bias(&self) -> Vector3<f64> {
        self.config.borrow().bias
    }

    pub fn bias_as(&self, unit: AccelerationUnit) -> Vector3<f64> {
        self.bias().map(|v| unit.from_si(v))
    }

    pub fn initial_ma(&self) -> Matrix3<f64> {
        self.config.borrow().initial_ma
    }

    pub fn initial_param(&self, param: CouplingParam) -> f64 {
        self.config.borrow().initial_ma[param.matrix_position()]
    }

    pub fn ground_truth_gravity_norm(&self) -> Option<f64> {
        self.config.borrow().ground_truth_gravity_norm
    }

    pub fn ground_truth_gravity_norm_as(&self, unit: AccelerationUnit) -> Option<f64> {
        self.ground_truth_gravity_norm().map(|g| unit.from_si(g))
    }

    pub fn fitter_options(&self) -> FitterOptions {
        self.config.borrow().fitter.clone()
    }

    pub fn listener(&self) -> Option<Rc<dyn CalibratorListener>> {
        self.config.borrow().listener.clone()
    }

    // ---------------------------------------------------------------------
    // Results
    // ---------------------------------------------------------------------

    /// Result of the last successful run.
    pub fn result(&self) -> Option<CalibrationResult> {
        self.result.borrow().clone()
    }

    pub fn estimated_ma(&self) -> Option<Matrix3<f64>> {
        self.result.borrow().as_ref().map(|r| r.estimated_ma)
    }

    pub fn estimated_covariance(&self) -> Option<DMatrix<f64>> {
        self.result.borrow().as_ref().map(|r| r.covariance.clone())
    }

    pub fn estimated_chi_sq(&self) -> Option<f64> {
        self.result.borrow().as_ref().map(|r| r.chi_sq)
    }

    pub fn estimated_mse(&self) -> Option<f64> {
        self.result.borrow().as_ref().map(|r| r.mse)
    }

    pub fn estimated_param(&self, param: CouplingParam) -> Option<f64> {
        self.result.borrow().as_ref().map(|r| r.param(param))
    }

    // ---------------------------------------------------------------------
    // Setters (all rejected while running)
    // ---------------------------------------------------------------------

    pub fn set_measurements(&self, measurements: impl Into<MeasurementSet>) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        self.config.borrow_mut().measurements = measurements.into();
        Ok(())
    }

    pub fn set_bias(&self, bias: Vector3<f64>) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        validate_vector("bias", &bias)?;
        self.config.borrow_mut().bias = bias;
        Ok(())
    }

    /// Set the bias from a slice; it must hold exactly three components.
    pub fn set_bias_from_slice(&self, bias: &[f64]) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        if bias.len() != 3 {
            return Err(CalibrationError::InvalidInput(format!(
                "bias must have 3 components, got {}",
                bias.len()
            )));
        }
        self.set_bias(Vector3::from_column_slice(bias))
    }

    pub fn set_bias_as(&self, bias: Vector3<f64>, unit: AccelerationUnit) -> Result<(), CalibrationError> {
        self.set_bias(bias.map(|v| unit.to_si(v)))
    }

    pub fn set_initial_ma(&self, ma: Matrix3<f64>) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        validate_matrix("initial Ma", &ma)?;
        self.config.borrow_mut().initial_ma = ma;
        Ok(())
    }

    /// Set the initial `Ma` from a dynamically sized matrix; it must be 3×3.
    pub fn set_initial_ma_from_dmatrix(&self, ma: &DMatrix<f64>) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        if ma.shape() != (3, 3) {
            return Err(CalibrationError::InvalidInput(format!(
                "initial Ma must be 3x3, got {}x{}",
                ma.nrows(),
                ma.ncols()
            )));
        }
        self.set_initial_ma(Matrix3::from_iterator(ma.iter().copied()))
    }

    pub fn set_initial_param(&self, param: CouplingParam, value: f64) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        if !value.is_finite() {
            return Err(CalibrationError::InvalidInput(format!(
                "initial {} must be finite, got {value}",
                param.name()
            )));
        }
        self.config.borrow_mut().initial_ma[param.matrix_position()] = value;
        Ok(())
    }

    pub fn set_initial_scaling_factors(&self, sx: f64, sy: f64, sz: f64) -> Result<(), CalibrationError> {
        let mut ma = self.initial_ma();
        ma[(0, 0)] = sx;
        ma[(1, 1)] = sy;
        ma[(2, 2)] = sz;
        self.set_initial_ma(ma)
    }

    pub fn set_initial_cross_coupling_errors(
        &self,
        mxy: f64,
        mxz: f64,
        myx: f64,
        myz: f64,
        mzx: f64,
        mzy: f64,
    ) -> Result<(), CalibrationError> {
        let mut ma = self.initial_ma();
        ma[(0, 1)] = mxy;
        ma[(0, 2)] = mxz;
        ma[(1, 0)] = myx;
        ma[(1, 2)] = myz;
        ma[(2, 0)] = mzx;
        ma[(2, 1)] = mzy;
        self.set_initial_ma(ma)
    }

    pub fn set_common_axis_used(&self, common_axis: bool) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        self.config.borrow_mut().common_axis = common_axis;
        Ok(())
    }

    /// Set the ground-truth gravity norm (m/s²). Must be finite and >= 0.
    pub fn set_ground_truth_gravity_norm(&self, gravity_norm: f64) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        validate_gravity_norm(gravity_norm)?;
        self.config.borrow_mut().ground_truth_gravity_norm = Some(gravity_norm);
        Ok(())
    }

    pub fn set_ground_truth_gravity_norm_as(
        &self,
        gravity_norm: f64,
        unit: AccelerationUnit,
    ) -> Result<(), CalibrationError> {
        self.set_ground_truth_gravity_norm(unit.to_si(gravity_norm))
    }

    pub fn set_fitter_options(&self, options: FitterOptions) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        options.validate().map_err(CalibrationError::InvalidInput)?;
        self.config.borrow_mut().fitter = options;
        Ok(())
    }

    pub fn set_listener(&self, listener: Option<Rc<dyn CalibratorListener>>) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        self.config.borrow_mut().listener = listener;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Calibration
    // ---------------------------------------------------------------------

    /// Estimate `Ma` from the configured measurements.
    ///
    /// On success the previous result is replaced. On failure it is left
    /// untouched. The running flag is released on every exit path.
    pub fn calibrate(&self) -> Result<(), CalibrationError> {
        self.ensure_not_running()?;
        self.check_ready()?;

        let _guard = RunningGuard::acquire(&self.running);

        let (job, listener) = {
            let config = self.config.borrow();
            (FitJob::from_config(&config)?, config.listener.clone())
        };

        if let Some(listener) = &listener {
            listener.on_calibrate_start(self);
        }

        debug!(
            "calibrating accelerometer: mode={}, measurements={}, g={:.6} m/s²",
            job.mode.display_name(),
            job.measurements.len(),
            job.gravity_norm
        );

        let result = match job.run() {
            Ok(result) => result,
            Err(err) => {
                warn!("accelerometer calibration failed: {err}");
                return Err(err.into());
            }
        };

        info!(
            "accelerometer calibration converged in {} iterations: chi_sq={:.6e}, mse={:.6e}",
            result.iterations, result.chi_sq, result.mse
        );
        *self.result.borrow_mut() = Some(result);

        if let Some(listener) = &listener {
            listener.on_calibrate_end(self);
        }

        Ok(())
    }

    fn ensure_not_running(&self) -> Result<(), CalibrationError> {
        if self.running.get() {
            Err(CalibrationError::Locked)
        } else {
            Ok(())
        }
    }

    fn check_ready(&self) -> Result<(), CalibrationError> {
        let config = self.config.borrow();
        let mode = AxisMode::from_common_axis(config.common_axis);

        let required = mode.min_measurements();
        let available = config.measurements.len();
        if available < required {
            return Err(CalibrationError::NotReady(format!(
                "{required} measurements required in {} mode, got {available}",
                mode.display_name()
            )));
        }
        if config.ground_truth_gravity_norm.is_none() {
            return Err(CalibrationError::NotReady(
                "ground-truth gravity norm is not set".to_string(),
            ));
        }
        Ok(())
    }
}

impl FitJob {
    fn from_config(config: &CalibratorConfig) -> Result<Self, CalibrationError> {
        let gravity_norm = config.ground_truth_gravity_norm.ok_or_else(|| {
            CalibrationError::NotReady("ground-truth gravity norm is not set".to_string())
        })?;
        Ok(Self {
            mode: AxisMode::from_common_axis(config.common_axis),
            measurements: config.measurements.clone(),
            bias: config.bias,
            initial_ma: config.initial_ma,
            gravity_norm,
            fitter: config.fitter.clone(),
        })
    }

    fn run(&self) -> Result<CalibrationResult, FitError> {
        let (x, sigma) = self.measurements.design();
        let g2 = self.gravity_norm * self.gravity_norm;
        let y = DVector::from_element(x.nrows(), g2);

        let initial_m = Matrix3::identity() + self.initial_ma;
        let initial = pack_params(self.mode, &initial_m);

        let mut evaluator = GravityNormEvaluator::new(self.mode, self.bias);
        let fitter = LevenbergMarquardtFitter::new(self.fitter.clone());
        debug!(
            "solver: max_iterations={}, tolerance={:e}",
            fitter.options().max_iterations,
            fitter.options().tolerance
        );
        let output = fitter.fit(&x, &y, &sigma, &initial, &mut evaluator)?;

        let m = unpack_params(self.mode, &output.params);
        let estimated_ma = m - Matrix3::identity();

        let covariance = match self.mode {
            AxisMode::General => output.covariance,
            AxisMode::CommonAxis => expand_common_axis_covariance(&output.covariance),
        };

        Ok(CalibrationResult {
            mode: self.mode,
            estimated_ma,
            covariance,
            chi_sq: output.chi_sq,
            mse: output.mse,
            iterations: output.iterations,
        })
    }
}

fn validate_gravity_norm(gravity_norm: f64) -> Result<(), CalibrationError> {
    if gravity_norm.is_finite() && gravity_norm >= 0.0 {
        Ok(())
    } else {
        Err(CalibrationError::InvalidInput(format!(
            "ground-truth gravity norm must be finite and >= 0, got {gravity_norm}"
        )))
    }
}

fn validate_vector(name: &str, v: &Vector3<f64>) -> Result<(), CalibrationError> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(CalibrationError::InvalidInput(format!("{name} must be finite")))
    }
}

fn validate_matrix(name: &str, m: &Matrix3<f64>) -> Result<(), CalibrationError> {
    if m.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(CalibrationError::InvalidInput(format!("{name} must be finite")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleConfig, generate_measurements};
    use crate::domain::is_suppressed;
    use approx::assert_abs_diff_eq;

    const G: f64 = 9.81;

    fn bias() -> Vector3<f64> {
        Vector3::new(0.1, -0.05, 0.2)
    }

    fn general_ma() -> Matrix3<f64> {
        Matrix3::new(0.01, 0.002, -0.001, 0.003, 0.02, 0.001, -0.002, 0.001, 0.015)
    }

    fn common_axis_ma() -> Matrix3<f64> {
        Matrix3::new(0.01, 0.002, -0.001, 0.0, 0.02, 0.001, 0.0, 0.0, 0.015)
    }

    fn samples(count: usize, ma: Matrix3<f64>, seed: u64) -> MeasurementSet {
        generate_measurements(&SampleConfig {
            count,
            seed,
            gravity_norm: G,
            bias: bias(),
            ma,
            std_dev: 0.01,
            noisy: false,
        })
        .unwrap()
    }

    fn ready_calibrator(common_axis: bool, measurements: MeasurementSet) -> Calibrator {
        Calibrator::from_config(CalibratorConfig {
            measurements,
            bias: bias(),
            common_axis,
            ground_truth_gravity_norm: Some(G),
            ..CalibratorConfig::default()
        })
        .unwrap()
    }

    /// Records lifecycle calls and what a re-entrant caller would see.
    #[derive(Default)]
    struct RecordingListener {
        starts: Cell<usize>,
        ends: Cell<usize>,
        saw_running: Cell<bool>,
        nested_calibrate: RefCell<Option<Result<(), CalibrationError>>>,
        nested_setter: RefCell<Option<Result<(), CalibrationError>>>,
        ma_during_run: RefCell<Option<Option<Matrix3<f64>>>>,
        reenter: bool,
    }

    impl CalibratorListener for RecordingListener {
        fn on_calibrate_start(&self, calibrator: &Calibrator) {
            self.starts.set(self.starts.get() + 1);
            self.saw_running.set(calibrator.is_running());
            if self.reenter {
                *self.nested_calibrate.borrow_mut() = Some(calibrator.calibrate());
                *self.nested_setter.borrow_mut() =
                    Some(calibrator.set_ground_truth_gravity_norm(1.0));
                *self.ma_during_run.borrow_mut() = Some(calibrator.estimated_ma());
            }
        }

        fn on_calibrate_end(&self, _calibrator: &Calibrator) {
            self.ends.set(self.ends.get() + 1);
        }
    }

    #[test]
    fn general_mode_recovers_coupling_matrix() {
        // 10 readings, g = 9.81, ba = [0.1, -0.05, 0.2].
        let calibrator = ready_calibrator(false, samples(10, general_ma(), 2024));
        assert!(calibrator.is_ready());
        assert!(calibrator.estimated_ma().is_none());

        calibrator.calibrate().unwrap();

        let ma = calibrator.estimated_ma().unwrap();
        assert_abs_diff_eq!(ma, general_ma(), epsilon = 1e-3);

        let result = calibrator.result().unwrap();
        assert_eq!(result.mode, AxisMode::General);
        assert_eq!(result.covariance.shape(), (9, 9));
        assert!(result.chi_sq.is_finite() && result.chi_sq >= 0.0);
        assert!(result.mse.is_finite() && result.mse < 1e-6);
        assert!(!calibrator.is_running());
    }

    #[test]
    fn general_mode_fit_reproduces_gravity_norm() {
        let measurements = samples(12, general_ma(), 11);
        let calibrator = ready_calibrator(false, measurements.clone());
        calibrator.calibrate().unwrap();

        let result = calibrator.result().unwrap();
        for meas in &measurements {
            let f_true = result.correct(meas.specific_force(), &bias()).unwrap();
            assert!((f_true.norm() - G).abs() < 1e-4, "norm={}", f_true.norm());
        }
    }

    #[test]
    fn common_axis_mode_recovers_upper_triangular_matrix() {
        let calibrator = ready_calibrator(true, samples(20, common_axis_ma(), 99));
        assert_eq!(calibrator.minimum_required_measurements(), 7);

        calibrator.calibrate().unwrap();
        let ma = calibrator.estimated_ma().unwrap();
        assert_abs_diff_eq!(ma, common_axis_ma(), epsilon = 1e-5);

        assert_eq!(ma[(1, 0)], 0.0);
        assert_eq!(ma[(2, 0)], 0.0);
        assert_eq!(ma[(2, 1)], 0.0);
    }

    #[test]
    fn common_axis_covariance_is_expanded() {
        let calibrator = ready_calibrator(true, samples(7, common_axis_ma(), 5));
        calibrator.calibrate().unwrap();

        let cov = calibrator.estimated_covariance().unwrap();
        assert_eq!(cov.shape(), (9, 9));
        for p in CouplingParam::ALL {
            let i = p.covariance_index();
            if is_suppressed(p) {
                assert!(cov.row(i).iter().all(|v| *v == 0.0), "{} row", p.name());
                assert!(cov.column(i).iter().all(|v| *v == 0.0), "{} column", p.name());
            } else {
                assert!(cov[(i, i)] > 0.0, "{} variance", p.name());
            }
        }
    }

    #[test]
    fn common_axis_sub_diagonal_is_zero_even_for_general_data() {
        // Data generated with sub-diagonal couplings; the constrained fit still
        // reports exact zeros in those slots.
        let calibrator = ready_calibrator(true, samples(15, general_ma(), 3));
        calibrator.calibrate().unwrap();
        let result = calibrator.result().unwrap();
        assert_eq!(result.myx(), 0.0);
        assert_eq!(result.mzx(), 0.0);
        assert_eq!(result.mzy(), 0.0);
    }

    #[test]
    fn too_few_measurements_is_not_ready_and_skips_solver() {
        let listener = Rc::new(RecordingListener::default());
        let calibrator = ready_calibrator(true, samples(6, common_axis_ma(), 1));
        calibrator.set_listener(Some(listener.clone())).unwrap();

        let err = calibrator.calibrate().unwrap_err();
        assert!(matches!(err, CalibrationError::NotReady(_)));
        assert_eq!(listener.starts.get(), 0);
        assert!(calibrator.estimated_ma().is_none());

        // Nine readings are enough for common-axis but not for general mode.
        calibrator.set_measurements(samples(9, common_axis_ma(), 1)).unwrap();
        assert!(calibrator.is_ready());
        calibrator.set_common_axis_used(false).unwrap();
        assert!(!calibrator.is_ready());
        assert!(matches!(
            calibrator.calibrate(),
            Err(CalibrationError::NotReady(_))
        ));
    }

    #[test]
    fn missing_gravity_norm_is_not_ready() {
        let calibrator = Calibrator::new();
        calibrator.set_measurements(samples(10, general_ma(), 1)).unwrap();
        assert!(!calibrator.is_ready());
        assert!(matches!(
            calibrator.calibrate(),
            Err(CalibrationError::NotReady(_))
        ));
    }

    #[test]
    fn negative_gravity_norm_is_rejected_immediately() {
        let calibrator = Calibrator::new();
        calibrator.set_ground_truth_gravity_norm(G).unwrap();

        let err = calibrator.set_ground_truth_gravity_norm(-1.0).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidInput(_)));
        assert_eq!(calibrator.ground_truth_gravity_norm(), Some(G));

        let err = Calibrator::from_config(CalibratorConfig {
            ground_truth_gravity_norm: Some(-9.81),
            ..CalibratorConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidInput(_)));
    }

    #[test]
    fn malformed_dimensions_are_rejected() {
        let calibrator = Calibrator::new();
        assert!(matches!(
            calibrator.set_bias_from_slice(&[0.1, 0.2]),
            Err(CalibrationError::InvalidInput(_))
        ));
        assert!(matches!(
            calibrator.set_initial_ma_from_dmatrix(&DMatrix::zeros(2, 3)),
            Err(CalibrationError::InvalidInput(_))
        ));

        calibrator.set_bias_from_slice(&[0.1, -0.05, 0.2]).unwrap();
        assert_eq!(calibrator.bias(), bias());
    }

    #[test]
    fn reentrant_calls_are_locked_and_keep_previous_result() {
        let calibrator = ready_calibrator(true, samples(10, common_axis_ma(), 8));
        calibrator.calibrate().unwrap();
        let previous = calibrator.estimated_ma();
        assert!(previous.is_some());

        let listener = Rc::new(RecordingListener {
            reenter: true,
            ..RecordingListener::default()
        });
        calibrator.set_listener(Some(listener.clone())).unwrap();
        calibrator.calibrate().unwrap();

        assert!(listener.saw_running.get());
        assert_eq!(
            *listener.nested_calibrate.borrow(),
            Some(Err(CalibrationError::Locked))
        );
        assert_eq!(
            *listener.nested_setter.borrow(),
            Some(Err(CalibrationError::Locked))
        );
        assert_eq!(*listener.ma_during_run.borrow(), Some(previous));
        assert_eq!(calibrator.ground_truth_gravity_norm(), Some(G));
        assert_eq!(listener.starts.get(), 1);
        assert_eq!(listener.ends.get(), 1);
        assert!(!calibrator.is_running());
    }

    #[test]
    fn failed_run_keeps_previous_result_and_releases_lock() {
        let calibrator = ready_calibrator(true, samples(10, common_axis_ma(), 21));
        calibrator.calibrate().unwrap();
        let previous = calibrator.result().unwrap();

        let listener = Rc::new(RecordingListener::default());
        calibrator.set_listener(Some(listener.clone())).unwrap();
        calibrator
            .set_fitter_options(FitterOptions {
                max_iterations: 1,
                ..FitterOptions::default()
            })
            .unwrap();

        let err = calibrator.calibrate().unwrap_err();
        assert_eq!(
            err,
            CalibrationError::Calibration(FitError::NotConverged { iterations: 1 })
        );
        assert_eq!(calibrator.result(), Some(previous));
        assert!(!calibrator.is_running());
        assert_eq!(listener.starts.get(), 1);
        assert_eq!(listener.ends.get(), 0);
    }

    #[test]
    fn singular_initial_guess_fails_and_keeps_previous_result() {
        let calibrator = ready_calibrator(true, samples(10, common_axis_ma(), 12));
        calibrator.calibrate().unwrap();
        let previous = calibrator.result().unwrap();

        // M = I + Ma = 0 cannot be inverted.
        calibrator.set_initial_ma(-Matrix3::identity()).unwrap();
        let err = calibrator.calibrate().unwrap_err();
        assert!(
            matches!(err, CalibrationError::Calibration(FitError::Algebra(_))),
            "unexpected error: {err}"
        );
        assert_eq!(calibrator.result(), Some(previous));
        assert!(!calibrator.is_running());
    }

    #[test]
    fn noisy_fit_converges_with_exact_iteration_budget() {
        let measurements = generate_measurements(&SampleConfig {
            count: 50,
            seed: 0,
            gravity_norm: G,
            bias: bias(),
            ma: common_axis_ma(),
            std_dev: 0.01,
            noisy: true,
        })
        .unwrap();
        let calibrator = ready_calibrator(true, measurements);
        calibrator.calibrate().unwrap();
        let unbounded = calibrator.result().unwrap();

        calibrator
            .set_fitter_options(FitterOptions {
                max_iterations: unbounded.iterations,
                ..FitterOptions::default()
            })
            .unwrap();
        calibrator.calibrate().unwrap();
        let bounded = calibrator.result().unwrap();
        assert_eq!(bounded.iterations, unbounded.iterations);
        assert_eq!(bounded.estimated_ma, unbounded.estimated_ma);
    }

    #[test]
    fn zero_gravity_norm_is_accepted() {
        let calibrator = ready_calibrator(true, samples(10, common_axis_ma(), 4));
        calibrator.set_ground_truth_gravity_norm(0.0).unwrap();
        calibrator
            .set_fitter_options(FitterOptions {
                max_iterations: 50,
                ..FitterOptions::default()
            })
            .unwrap();
        assert!(calibrator.is_ready());

        match calibrator.calibrate() {
            Ok(()) | Err(CalibrationError::Calibration(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(!calibrator.is_running());
    }

    #[test]
    fn initial_guess_setters_fill_named_entries() {
        let calibrator = Calibrator::new();
        calibrator.set_initial_scaling_factors(0.1, 0.2, 0.3).unwrap();
        calibrator
            .set_initial_cross_coupling_errors(0.01, 0.02, 0.03, 0.04, 0.05, 0.06)
            .unwrap();
        calibrator.set_initial_param(CouplingParam::Mzy, 0.07).unwrap();

        let ma = calibrator.initial_ma();
        assert_eq!(ma, Matrix3::new(0.1, 0.01, 0.02, 0.03, 0.2, 0.04, 0.05, 0.07, 0.3));
        assert_eq!(calibrator.initial_param(CouplingParam::Myz), 0.04);
        assert!(calibrator.set_initial_param(CouplingParam::Sx, f64::NAN).is_err());
    }

    #[test]
    fn unit_aware_setters_convert_to_si() {
        let calibrator = Calibrator::new();
        calibrator
            .set_ground_truth_gravity_norm_as(1.0, AccelerationUnit::Gravity)
            .unwrap();
        assert_eq!(
            calibrator.ground_truth_gravity_norm(),
            Some(crate::domain::STANDARD_GRAVITY)
        );
        assert!((calibrator.ground_truth_gravity_norm_as(AccelerationUnit::Gravity).unwrap() - 1.0).abs() < 1e-15);

        calibrator
            .set_bias_as(Vector3::new(1.0, 0.0, -1.0), AccelerationUnit::FeetPerSquaredSecond)
            .unwrap();
        assert!((calibrator.bias() - Vector3::new(0.3048, 0.0, -0.3048)).norm() < 1e-15);
    }

    #[test]
    fn new_result_replaces_previous_one() {
        let calibrator = ready_calibrator(true, samples(10, common_axis_ma(), 30));
        calibrator.calibrate().unwrap();
        let first = calibrator.estimated_ma().unwrap();

        calibrator.set_measurements(samples(10, Matrix3::zeros(), 31)).unwrap();
        calibrator.calibrate().unwrap();
        let second = calibrator.estimated_ma().unwrap();

        assert_abs_diff_eq!(second, Matrix3::zeros(), epsilon = 1e-5);
        assert!((first - second).norm() > 1e-3);
    }
}
