//! Error types for speem-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for speem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for speem operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON record.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The timing calibration record could not be loaded.
    #[error("failed to load calibration from {path}: {reason}")]
    CalibrationLoad { path: PathBuf, reason: String },

    /// The timing calibration record holds unusable values.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Axis index outside 0..3.
    #[error("invalid axis index: {0}")]
    InvalidAxis(usize),

    /// Array passed as a frame does not have three columns.
    #[error("frame must have 3 columns, got {0}")]
    InvalidFrameShape(usize),
}
