//! speem-marginal: Live marginal histograms for SPEEM detector frames.
//!
//! Converted frames are binned into three 2D marginals, one per hit axis,
//! each integrating its axis out over an adjustable window. The
//! [`LiveMonitor`] wraps the accumulator with count-rate tracking and
//! debounced window edits for a rendering front end.

pub mod accumulator;
pub mod debounce;
pub mod error;
pub mod histogram;
pub mod monitor;
pub mod window;

pub use accumulator::{AccumulationMode, MarginalAccumulator};
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use histogram::{GridAxis, Histogram2D};
pub use monitor::{LiveMonitor, MonitorSnapshot};
pub use window::{Axis, MarginalWindow};
