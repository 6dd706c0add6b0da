//! Conversion from raw detector bins to physical units.
//!
//! Positions are linear in the bin index and centred on the detector.
//! Time of flight is *decreasing* in the bin index: bin 0 carries the
//! largest time. The time-bin edges used for histogramming are rebuilt
//! whenever the timing delay changes, so they always run ascending from
//! `bin_to_time(bins_per_channel)` to `bin_to_time(0)`.

use crate::frame::{T, X, Y};
use crate::settings::clamp_timing_delay;
use crate::{CalibrationModel, DetectorSettings, Frame, RawFrame};
use log::debug;
use ndarray::{Array1, Array2, Zip};

/// Frames with more rows than this are converted in parallel.
const PARALLEL_THRESHOLD: usize = 64 * 1024;

/// `n` evenly spaced values from `start` to `end`, both included.
#[must_use]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    Array1::linspace(start, end, n).to_vec()
}

/// Maps raw `(x_bin, y_bin, t_bin)` triples to `(mm, mm, ns)`.
#[derive(Debug, Clone)]
pub struct CoordinateConverter {
    calibration: CalibrationModel,
    timing_delay: f64,
    bins_per_channel: u16,
    mm_per_bin: f64,
    data_size: usize,
    xy_extent_mm: f64,
    t_bins: Vec<f64>,
}

impl CoordinateConverter {
    /// Creates a converter using the timing delay stored in `settings`.
    #[must_use]
    pub fn new(settings: &DetectorSettings, calibration: CalibrationModel) -> Self {
        let mut converter = Self {
            calibration,
            timing_delay: clamp_timing_delay(settings.timing_delay),
            bins_per_channel: settings.bins_per_channel,
            mm_per_bin: settings.mm_per_bin(),
            data_size: settings.data_size(),
            xy_extent_mm: settings.xy_extent_mm,
            t_bins: Vec::new(),
        };
        converter.rebuild_time_edges();
        converter
    }

    /// Position in millimetres of a raw x or y bin, with 0 at the detector centre.
    #[inline]
    #[must_use]
    pub fn bin_to_position(&self, bin: f64) -> f64 {
        (bin - f64::from(self.bins_per_channel / 2)) * self.mm_per_bin
    }

    /// Time of flight in nanoseconds of a raw time bin.
    #[inline]
    #[must_use]
    pub fn bin_to_time(&self, bin: f64) -> f64 {
        (self.timing_delay - self.calibration.offset) - bin * self.calibration.slope
    }

    /// Convert a whole raw frame.
    ///
    /// Every row is converted with the same arithmetic as the scalar
    /// [`bin_to_position`](Self::bin_to_position) and
    /// [`bin_to_time`](Self::bin_to_time). Empty frames yield empty frames.
    #[must_use]
    pub fn convert(&self, raw: &RawFrame) -> Frame {
        let raw = raw.view();
        let mut out = Array2::<f64>::zeros((raw.nrows(), 3));

        let zip = Zip::from(out.rows_mut()).and(raw.rows());
        let convert_row = |mut row: ndarray::ArrayViewMut1<'_, f64>,
                           bins: ndarray::ArrayView1<'_, u16>| {
            row[X] = self.bin_to_position(f64::from(bins[X]));
            row[Y] = self.bin_to_position(f64::from(bins[Y]));
            row[T] = self.bin_to_time(f64::from(bins[T]));
        };
        if raw.nrows() > PARALLEL_THRESHOLD {
            zip.par_for_each(convert_row);
        } else {
            zip.for_each(convert_row);
        }

        // Shape is (n, 3) by construction.
        Frame::from_array(out).unwrap_or_default()
    }

    /// Current timing delay in nanoseconds.
    #[must_use]
    pub fn timing_delay(&self) -> f64 {
        self.timing_delay
    }

    /// Set the timing delay, clamped to
    /// [`TIMING_DELAY_RANGE`](crate::settings::TIMING_DELAY_RANGE), and
    /// rebuild the time-bin edges. Returns the delay applied.
    pub fn set_timing_delay(&mut self, timing_delay: f64) -> f64 {
        self.timing_delay = clamp_timing_delay(timing_delay);
        self.rebuild_time_edges();
        debug!(
            "timing delay set to {} ns, time axis {:?}",
            self.timing_delay,
            self.time_range()
        );
        self.timing_delay
    }

    /// Active calibration.
    #[must_use]
    pub fn calibration(&self) -> CalibrationModel {
        self.calibration
    }

    /// Ascending time-bin edges, `data_size + 1` values.
    #[must_use]
    pub fn t_bins(&self) -> &[f64] {
        &self.t_bins
    }

    /// Time labels for the histogram time axis, from `time(0)` down to
    /// `time(bins_per_channel)`, `data_size` values.
    #[must_use]
    pub fn t_coords(&self) -> Vec<f64> {
        linspace(
            self.bin_to_time(0.0),
            self.bin_to_time(f64::from(self.bins_per_channel)),
            self.data_size,
        )
    }

    /// Spatial histogram edges, `data_size + 1` values.
    #[must_use]
    pub fn xy_edges(&self) -> Vec<f64> {
        linspace(-self.xy_extent_mm, self.xy_extent_mm, self.data_size + 1)
    }

    /// `(min, max)` time reachable by a raw bin in `0..=bins_per_channel`.
    #[must_use]
    pub fn time_range(&self) -> (f64, f64) {
        (
            self.bin_to_time(f64::from(self.bins_per_channel)),
            self.bin_to_time(0.0),
        )
    }

    /// Histogram bins per axis.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    fn rebuild_time_edges(&mut self) {
        let (low, high) = self.time_range();
        self.t_bins = linspace(low, high, self.data_size + 1);
    }
}
