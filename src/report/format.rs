//! Formatted terminal output for calibration runs.

use nalgebra::{DMatrix, Matrix3};

use crate::domain::{AccelerationUnit, AxisMode, CalibrationResult, CouplingParam, is_suppressed};

/// Context of a run, printed above the estimates.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub source: String,
    pub measurement_count: usize,
    /// Gravity norm used for the fit (m/s²).
    pub gravity_norm: f64,
    /// Unit used when echoing the gravity norm.
    pub unit: AccelerationUnit,
}

/// Format the full run summary (inputs + fit statistics + estimated matrix).
pub fn format_run_summary(context: &RunContext, result: &CalibrationResult) -> String {
    let mut out = String::new();

    out.push_str("=== accal - Accelerometer Coupling Calibration ===\n");
    out.push_str(&format!("Input: {}\n", context.source));
    out.push_str(&format!(
        "Mode: {} | measurements={} | required={}\n",
        result.mode.display_name(),
        context.measurement_count,
        result.mode.min_measurements()
    ));
    out.push_str(&format!(
        "Gravity: {:.6} {} ({:.6} m/s²)\n",
        context.unit.from_si(context.gravity_norm),
        context.unit.symbol(),
        context.gravity_norm
    ));
    out.push_str(&format!(
        "Fit: iterations={} chi_sq={:.6e} mse={:.6e}\n",
        result.iterations, result.chi_sq, result.mse
    ));

    out.push_str("\nEstimated Ma:\n");
    out.push_str(&fmt_matrix(&result.estimated_ma));

    out.push_str("\nParameters:\n");
    out.push_str(&format_param_table(result));
    out.push_str(&format!("\nAverage std dev: {:.6e}\n", result.average_std_dev()));

    out
}

/// Format the per-parameter estimate table.
pub fn format_param_table(result: &CalibrationResult) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<6} {:>14} {:>14} {:<10}\n", "param", "value", "std_dev", "").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<6} {:-<14} {:-<14}\n", "", "", "").trim_end());
    out.push('\n');

    for p in CouplingParam::ALL {
        let fixed = result.mode == AxisMode::CommonAxis && is_suppressed(p);
        let note = if fixed { "(fixed)" } else { "" };
        out.push_str(
            format!(
                "{:<6} {:>14.6e} {:>14.6e} {:<10}\n",
                p.name(),
                result.param(p),
                result.std_dev(p),
                note
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Format the 9×9 covariance with parameter labels.
pub fn format_covariance(cov: &DMatrix<f64>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<6}", ""));
    for p in CouplingParam::ALL {
        out.push_str(&format!(" {:>11}", p.name()));
    }
    out.push('\n');

    for p in CouplingParam::ALL {
        let i = p.covariance_index();
        out.push_str(&format!("{:<6}", p.name()));
        for q in CouplingParam::ALL {
            out.push_str(&format!(" {:>11.3e}", cov[(i, q.covariance_index())]));
        }
        out.push('\n');
    }

    out
}

fn fmt_matrix(m: &Matrix3<f64>) -> String {
    let mut out = String::new();
    for r in 0..3 {
        let parts: Vec<String> = (0..3).map(|c| format!("{:>12.6}", m[(r, c)])).collect();
        out.push_str(&format!("[{}]\n", parts.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mode: AxisMode) -> CalibrationResult {
        CalibrationResult {
            mode,
            estimated_ma: Matrix3::new(0.01, 0.002, -0.001, 0.0, 0.02, 0.001, 0.0, 0.0, 0.015),
            covariance: DMatrix::identity(9, 9) * 1e-8,
            chi_sq: 1.25,
            mse: 2.5e-7,
            iterations: 7,
        }
    }

    #[test]
    fn summary_mentions_mode_and_gravity() {
        let context = RunContext {
            source: "session.json".to_string(),
            measurement_count: 12,
            gravity_norm: crate::domain::STANDARD_GRAVITY,
            unit: AccelerationUnit::Gravity,
        };
        let text = format_run_summary(&context, &result(AxisMode::CommonAxis));
        assert!(text.contains("Mode: common z-axis | measurements=12 | required=7"));
        assert!(text.contains("Gravity: 1.000000 g"));
        assert!(text.contains("iterations=7"));
        assert!(text.contains("Estimated Ma:"));
    }

    #[test]
    fn param_table_marks_fixed_entries_only_in_common_axis_mode() {
        let common = format_param_table(&result(AxisMode::CommonAxis));
        assert_eq!(common.matches("(fixed)").count(), 3);
        assert!(common.lines().any(|l| l.starts_with("myx") && l.ends_with("(fixed)")));

        let general = format_param_table(&result(AxisMode::General));
        assert!(!general.contains("(fixed)"));
        assert_eq!(general.lines().count(), 2 + 9);
    }

    #[test]
    fn covariance_has_header_and_nine_rows() {
        let text = format_covariance(&DMatrix::identity(9, 9));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines[0].contains("mzy"));
        assert!(lines[1].starts_with("sx"));
    }
}
