//! Persisted time-of-flight calibration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Linear time-of-flight calibration.
///
/// Time for a raw bin is `(timing_delay - offset) - bin * slope`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    /// Time offset in nanoseconds.
    pub offset: f64,
    /// Nanoseconds per time bin.
    pub slope: f64,
}

impl CalibrationModel {
    /// Creates a calibration, rejecting values that cannot define a time axis.
    ///
    /// # Errors
    /// Returns an error for non-finite values or a slope that is not positive.
    pub fn new(offset: f64, slope: f64) -> Result<Self> {
        let model = Self { offset, slope };
        model.validate()?;
        Ok(model)
    }

    /// Load the calibration record from a JSON file with `offset` and `slope` keys.
    ///
    /// # Errors
    /// Any failure here leaves the pipeline without a time axis, so every
    /// error is reported as [`Error::CalibrationLoad`] with the path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| Error::CalibrationLoad {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        Self::from_json(&text).map_err(|e| load_error(e.to_string()))
    }

    /// Parse the calibration record from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if !self.offset.is_finite() || !self.slope.is_finite() {
            return Err(Error::InvalidCalibration(format!(
                "offset {} and slope {} must be finite",
                self.offset, self.slope
            )));
        }
        if self.slope <= 0.0 {
            return Err(Error::InvalidCalibration(format!(
                "slope must be positive, got {}",
                self.slope
            )));
        }
        Ok(())
    }
}
