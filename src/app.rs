//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real entry point that:
//! - installs the logger
//! - parses CLI arguments
//! - generates synthetic sessions (`simulate`)
//! - runs the calibration pipeline and prints the report (`fit`)
//! - writes optional exports and prints saved results (`show`)

use clap::Parser;
use log::{LevelFilter, info};
use nalgebra::{Matrix3, Vector3};

use crate::cli::{Cli, Command, FitArgs, ShowArgs, SimulateArgs};
use crate::data::{SampleConfig, generate_measurements};
use crate::domain::AccelerationUnit;
use crate::error::AppError;
use crate::io::{MeasurementFile, ResultFile, read_result_json, write_measurement_file, write_result_json};
use crate::math::FitterOptions;
use crate::report::{RunContext, format_covariance, format_param_table, format_residuals, format_run_summary};

pub mod pipeline;

use pipeline::FitJobConfig;

/// Entry point for the `accal` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Show(args) => handle_show(args),
    }
}

/// `RUST_LOG` wins; otherwise log at `info`.
fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = sample_config_from_args(&args)?;
    let set = generate_measurements(&config)?;

    let file = MeasurementFile::from_set(&set, args.unit, Some(config.gravity_norm), &config.bias);
    write_measurement_file(&args.output, &file)?;

    info!(
        "wrote {} measurements to '{}'",
        set.len(),
        args.output.display()
    );
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_job_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    let context = RunContext {
        source: args.input.display().to_string(),
        measurement_count: run.measurements.len(),
        gravity_norm: run.gravity_norm,
        unit: args.unit,
    };
    println!("{}", format_run_summary(&context, &run.result));

    if args.covariance {
        println!("Covariance:\n{}", format_covariance(&run.result.covariance));
    }

    if !run.worst.is_empty() {
        println!("Largest residuals (m/s²):\n{}", format_residuals(&run.worst));
    }

    if let Some(path) = &args.export {
        let export = ResultFile::from_result(
            &run.result,
            run.gravity_norm,
            [run.bias.x, run.bias.y, run.bias.z],
        );
        write_result_json(path, &export)?;
        info!("exported calibration result to '{}'", path.display());
    }

    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let file = read_result_json(&args.result)?;
    println!("{}", format_saved_result(&file)?);

    if args.covariance {
        println!("Covariance:\n{}", format_covariance(&file.to_result()?.covariance));
    }
    Ok(())
}

/// Header and parameter table for a result exported by `fit --export`.
pub fn format_saved_result(file: &ResultFile) -> Result<String, AppError> {
    let result = file.to_result()?;
    let mut out = String::new();
    out.push_str(&format!(
        "Result from {} ({} mode)\n",
        file.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        result.mode.display_name()
    ));
    out.push_str(&format!(
        "Gravity: {:.6} m/s² | bias=[{:.6}, {:.6}, {:.6}] m/s²\n",
        file.gravity_norm, file.bias[0], file.bias[1], file.bias[2]
    ));
    out.push_str(&format!(
        "Fit: iterations={} chi_sq={:.6e} mse={:.6e}\n\n",
        result.iterations, result.chi_sq, result.mse
    ));
    out.push_str(&format_param_table(&result));
    Ok(out)
}

/// Convert `simulate` arguments to a generator configuration in SI units.
pub fn sample_config_from_args(args: &SimulateArgs) -> Result<SampleConfig, AppError> {
    let unit = args.unit;
    let bias = vector_from_args("--bias", &args.bias, unit)?;

    if args.ma.len() != 9 {
        return Err(AppError::new(
            2,
            format!("--ma expects 9 values, got {}", args.ma.len()),
        ));
    }
    let ma = Matrix3::from_row_slice(&args.ma);

    if !(args.noise.is_finite() && args.noise >= 0.0) {
        return Err(AppError::new(
            2,
            format!("--noise must be finite and >= 0, got {}", args.noise),
        ));
    }
    let noisy = args.noise > 0.0;
    let std_dev = if noisy { args.noise } else { args.std_dev };

    Ok(SampleConfig {
        count: args.count,
        seed: args.seed,
        gravity_norm: unit.to_si(args.gravity),
        bias,
        ma,
        std_dev: unit.to_si(std_dev),
        noisy,
    })
}

/// Convert `fit` arguments to a pipeline job in SI units.
pub fn fit_job_from_args(args: &FitArgs) -> Result<FitJobConfig, AppError> {
    let bias = args
        .bias
        .as_deref()
        .map(|values| vector_from_args("--bias", values, args.unit))
        .transpose()?;

    Ok(FitJobConfig {
        input: args.input.clone(),
        common_axis: args.common_axis,
        gravity_norm: args.gravity.map(|g| args.unit.to_si(g)),
        bias,
        fitter: FitterOptions {
            max_iterations: args.max_iterations,
            tolerance: args.tolerance,
            ..FitterOptions::default()
        },
        top_n: args.top,
    })
}

fn vector_from_args(flag: &str, values: &[f64], unit: AccelerationUnit) -> Result<Vector3<f64>, AppError> {
    if values.len() != 3 {
        return Err(AppError::new(
            2,
            format!("{flag} expects 3 values, got {}", values.len()),
        ));
    }
    Ok(Vector3::new(
        unit.to_si(values[0]),
        unit.to_si(values[1]),
        unit.to_si(values[2]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn simulate_args() -> SimulateArgs {
        SimulateArgs {
            count: 10,
            seed: 1,
            gravity: 1.0,
            bias: vec![0.01, 0.0, -0.01],
            ma: vec![0.01, 0.002, -0.001, 0.003, 0.02, 0.001, -0.002, 0.001, 0.015],
            noise: 0.0,
            std_dev: 0.001,
            unit: AccelerationUnit::Gravity,
            output: PathBuf::from("out.json"),
        }
    }

    #[test]
    fn simulate_args_convert_to_si() {
        let config = sample_config_from_args(&simulate_args()).unwrap();
        let g = crate::domain::STANDARD_GRAVITY;
        assert_eq!(config.gravity_norm, g);
        assert_eq!(config.bias, Vector3::new(0.01 * g, 0.0, -0.01 * g));
        assert_eq!(config.ma[(1, 0)], 0.003);
        assert_eq!(config.ma[(2, 0)], -0.002);
        assert!(!config.noisy);
        assert_eq!(config.std_dev, 0.001 * g);
    }

    #[test]
    fn noise_enables_noisy_sampling() {
        let args = SimulateArgs {
            noise: 0.05,
            unit: AccelerationUnit::MetersPerSquaredSecond,
            ..simulate_args()
        };
        let config = sample_config_from_args(&args).unwrap();
        assert!(config.noisy);
        assert_eq!(config.std_dev, 0.05);
    }

    #[test]
    fn wrong_vector_lengths_are_invalid_input() {
        let args = SimulateArgs {
            bias: vec![0.0, 0.0],
            ..simulate_args()
        };
        assert_eq!(sample_config_from_args(&args).unwrap_err().exit_code(), 2);

        let args = SimulateArgs {
            ma: vec![0.0; 6],
            ..simulate_args()
        };
        assert_eq!(sample_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn negative_noise_is_invalid_input() {
        let args = SimulateArgs {
            noise: -0.01,
            ..simulate_args()
        };
        let err = sample_config_from_args(&args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("--noise"));

        let args = SimulateArgs {
            noise: f64::NAN,
            ..simulate_args()
        };
        assert_eq!(sample_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn saved_result_is_printed_with_parameters() {
        let result = crate::domain::CalibrationResult {
            mode: crate::domain::AxisMode::CommonAxis,
            estimated_ma: Matrix3::new(0.01, 0.002, -0.001, 0.0, 0.02, 0.001, 0.0, 0.0, 0.015),
            covariance: nalgebra::DMatrix::identity(9, 9) * 1e-8,
            chi_sq: 2.0,
            mse: 1e-7,
            iterations: 9,
        };
        let file = ResultFile::from_result(&result, 9.81, [0.1, -0.05, 0.2]);

        let path = std::env::temp_dir().join(format!("accal-show-{}.json", std::process::id()));
        write_result_json(&path, &file).unwrap();
        let read = read_result_json(&path);
        let _ = std::fs::remove_file(&path);

        let text = format_saved_result(&read.unwrap()).unwrap();
        assert!(text.contains("common z-axis mode"));
        assert!(text.contains("iterations=9"));
        assert_eq!(text.matches("(fixed)").count(), 3);
    }

    #[test]
    fn fit_args_convert_overrides() {
        let args = FitArgs {
            input: PathBuf::from("in.json"),
            common_axis: true,
            gravity: Some(32.0),
            unit: AccelerationUnit::FeetPerSquaredSecond,
            bias: Some(vec![1.0, 0.0, 0.0]),
            max_iterations: 100,
            tolerance: 1e-6,
            top: 2,
            covariance: false,
            export: None,
        };
        let job = fit_job_from_args(&args).unwrap();
        assert!((job.gravity_norm.unwrap() - 32.0 * 0.3048).abs() < 1e-12);
        assert!((job.bias.unwrap().x - 0.3048).abs() < 1e-15);
        assert_eq!(job.fitter.max_iterations, 100);
        assert_eq!(job.fitter.initial_lambda, FitterOptions::default().initial_lambda);
    }
}
