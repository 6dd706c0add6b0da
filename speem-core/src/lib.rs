//! speem-core: Core types for the SPEEM detector event pipeline.
//!
//! This crate provides the hit and frame data structures, detector settings,
//! the persisted timing calibration, conversion from raw detector bins to
//! physical units, and count-rate tracking.
//!

pub mod calibration;
pub mod convert;
pub mod error;
pub mod frame;
pub mod hit;
pub mod rate;
pub mod settings;

pub use calibration::CalibrationModel;
pub use convert::{linspace, CoordinateConverter};
pub use error::{Error, Result};
pub use frame::{Frame, RawFrame};
pub use hit::{HitBatch, RawHit};
pub use rate::RateTracker;
pub use settings::DetectorSettings;
