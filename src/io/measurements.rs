//! Read/write measurement JSON files.
//!
//! A measurement file is the portable form of one static calibration session:
//! - the unit every acceleration value in the file is expressed in
//! - the local gravity norm (if known) and the known accelerometer bias
//! - the list of specific-force readings with their standard deviations
//!
//! Values are converted to m/s² when the file is turned into a
//! `MeasurementSet`, and from m/s² when a file is built from one.

use std::fs::File;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::domain::{AccelerationUnit, Measurement, MeasurementSet};
use crate::error::{AppError, CalibrationError};

/// One reading as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub specific_force: [f64; 3],
    pub std_dev: f64,
}

/// On-disk measurement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFile {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub unit: AccelerationUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_norm: Option<f64>,
    #[serde(default)]
    pub bias: [f64; 3],
    pub measurements: Vec<MeasurementRecord>,
}

fn default_tool() -> String {
    "accal".to_string()
}

impl MeasurementFile {
    /// Build a file from SI values, expressing everything in `unit`.
    pub fn from_set(
        set: &MeasurementSet,
        unit: AccelerationUnit,
        gravity_norm: Option<f64>,
        bias: &Vector3<f64>,
    ) -> Self {
        let measurements = set
            .iter()
            .map(|m| {
                let f = m.specific_force();
                MeasurementRecord {
                    specific_force: [unit.from_si(f.x), unit.from_si(f.y), unit.from_si(f.z)],
                    std_dev: unit.from_si(m.specific_force_std_dev()),
                }
            })
            .collect();

        Self {
            tool: default_tool(),
            unit,
            gravity_norm: gravity_norm.map(|g| unit.from_si(g)),
            bias: [unit.from_si(bias.x), unit.from_si(bias.y), unit.from_si(bias.z)],
            measurements,
        }
    }

    /// Readings converted to m/s².
    pub fn measurement_set(&self) -> Result<MeasurementSet, CalibrationError> {
        self.measurements
            .iter()
            .map(|r| {
                let f = Vector3::from(r.specific_force).map(|v| self.unit.to_si(v));
                Measurement::new(f, self.unit.to_si(r.std_dev))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(MeasurementSet::from)
    }

    /// Gravity norm converted to m/s².
    pub fn gravity_norm_si(&self) -> Option<f64> {
        self.gravity_norm.map(|g| self.unit.to_si(g))
    }

    /// Bias converted to m/s².
    pub fn bias_si(&self) -> Vector3<f64> {
        Vector3::from(self.bias).map(|v| self.unit.to_si(v))
    }
}

/// Write a measurement JSON file.
pub fn write_measurement_file(path: &Path, file: &MeasurementFile) -> Result<(), AppError> {
    let out = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create measurement JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::new(2, format!("Failed to write measurement JSON: {e}")))?;
    Ok(())
}

/// Read a measurement JSON file.
pub fn read_measurement_file(path: &Path) -> Result<MeasurementFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open measurement JSON '{}': {e}", path.display()))
    })?;
    let parsed: MeasurementFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid measurement JSON: {e}")))?;
    Ok(parsed)
}
