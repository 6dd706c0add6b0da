//! The three windowed marginals of a stream of converted frames.
//!
//! Marginal `i` is a histogram over the two axes other than `i`, filled
//! with the events whose axis-`i` coordinate lies in window `i`:
//!
//! | marginal | rows | columns |
//! |----------|------|---------|
//! | x        | y    | t       |
//! | y        | x    | t       |
//! | t        | x    | y       |
//!
//! The 1D projections are sums of these grids rather than new binnings:
//! x and y come from the t marginal, t from the x marginal.

use crate::histogram::{GridAxis, Histogram2D};
use crate::window::{Axis, MarginalWindow};
use crate::Result;
use log::debug;
use ndarray::Array1;
use rayon::prelude::*;
use speem_core::{CoordinateConverter, Frame};
use std::sync::Arc;

/// Whether marginals show only the newest frame or everything since reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccumulationMode {
    /// Each ingest replaces the marginals.
    #[default]
    LatestOnly,
    /// Each ingest adds to the marginals; every frame is retained so the
    /// marginals can be rebuilt when a window changes.
    Accumulate,
}

/// Windowed 2D marginals and their 1D projections.
#[derive(Debug, Clone)]
pub struct MarginalAccumulator {
    mode: AccumulationMode,
    marginals: [Histogram2D; 3],
    windows: [MarginalWindow; 3],
    history: Vec<Arc<Frame>>,
}

impl MarginalAccumulator {
    /// Creates empty marginals with fixed spatial edges and time edges.
    ///
    /// # Errors
    /// Returns an error if either edge list is invalid.
    pub fn new(xy_edges: &[f64], t_edges: &[f64]) -> Result<Self> {
        let marginals = [
            Histogram2D::new(xy_edges.to_vec(), t_edges.to_vec())?,
            Histogram2D::new(xy_edges.to_vec(), t_edges.to_vec())?,
            Histogram2D::new(xy_edges.to_vec(), xy_edges.to_vec())?,
        ];
        Ok(Self {
            mode: AccumulationMode::default(),
            marginals,
            windows: [MarginalWindow::default(); 3],
            history: Vec::new(),
        })
    }

    /// Marginals binned on the converter's spatial edges and `t_bins`.
    ///
    /// # Errors
    /// Returns an error if the converter's edges are invalid.
    pub fn from_converter(converter: &CoordinateConverter) -> Result<Self> {
        Self::new(&converter.xy_edges(), converter.t_bins())
    }

    #[must_use]
    pub fn mode(&self) -> AccumulationMode {
        self.mode
    }

    /// Add a frame according to the current mode.
    pub fn ingest(&mut self, frame: Arc<Frame>) {
        match self.mode {
            AccumulationMode::LatestOnly => {
                for (axis, marginal) in Axis::ALL.into_iter().zip(&mut self.marginals) {
                    marginal.clear();
                    fill_marginal(marginal, &frame, axis, &self.windows[axis.index()]);
                }
                self.history.clear();
            }
            AccumulationMode::Accumulate => {
                for (axis, marginal) in Axis::ALL.into_iter().zip(&mut self.marginals) {
                    fill_marginal(marginal, &frame, axis, &self.windows[axis.index()]);
                }
            }
        }
        self.history.push(frame);
    }

    /// The marginal integrating `axis` out.
    #[must_use]
    pub fn get_marginal(&self, axis: Axis) -> &Histogram2D {
        &self.marginals[axis.index()]
    }

    /// Counts along `axis`, summed from an existing marginal.
    #[must_use]
    pub fn get_1d_projection(&self, axis: Axis) -> Array1<f64> {
        match axis {
            Axis::X => self.marginals[Axis::T.index()].project(GridAxis::Cols),
            Axis::Y => self.marginals[Axis::T.index()].project(GridAxis::Rows),
            Axis::T => self.marginals[Axis::X.index()].project(GridAxis::Rows),
        }
    }

    #[must_use]
    pub fn window(&self, axis: Axis) -> MarginalWindow {
        self.windows[axis.index()]
    }

    /// Set the window on `axis` and rebuild the marginal integrating it out.
    ///
    /// In accumulate mode this walks the whole retained history; callers
    /// driven by UI input should debounce it.
    pub fn set_window(&mut self, axis: Axis, low: f64, high: f64) {
        self.windows[axis.index()] = MarginalWindow::new(low, high);
        self.recompute(axis);
    }

    /// Rebuild one marginal from the retained frames.
    pub fn recompute(&mut self, axis: Axis) {
        let window = self.windows[axis.index()];
        let template = self.marginals[axis.index()].empty_like();
        let rebuilt = self
            .history
            .par_iter()
            .map(|frame| {
                let mut partial = template.empty_like();
                fill_marginal(&mut partial, frame, axis, &window);
                partial
            })
            .reduce(
                || template.empty_like(),
                |mut a, b| {
                    a.add(&b);
                    a
                },
            );
        debug!(
            "recomputed {axis} marginal from {} frames, {} counts",
            self.history.len(),
            rebuilt.total()
        );
        self.marginals[axis.index()] = rebuilt;
    }

    /// Rebuild every marginal.
    pub fn recompute_all(&mut self) {
        for axis in Axis::ALL {
            self.recompute(axis);
        }
    }

    /// Switch modes, keeping only the newest frame, and rebuild.
    pub fn set_mode(&mut self, mode: AccumulationMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        if let Some(latest) = self.history.pop() {
            self.history.clear();
            self.history.push(latest);
        }
        self.recompute_all();
    }

    /// Relabel the time axis, for example after a timing-delay change.
    /// Counts are not touched.
    ///
    /// # Errors
    /// Returns an error if the edges are invalid or change the bin count.
    pub fn set_time_edges(&mut self, t_edges: &[f64]) -> Result<()> {
        for axis in [Axis::X, Axis::Y] {
            self.marginals[axis.index()].set_col_edges(t_edges.to_vec())?;
        }
        Ok(())
    }

    /// Number of events of `frame` inside all three windows.
    #[must_use]
    pub fn count_in_windows(&self, frame: &Frame) -> usize {
        frame
            .rows()
            .filter(|row| {
                Axis::ALL
                    .iter()
                    .all(|axis| self.windows[axis.index()].contains(row[axis.index()]))
            })
            .count()
    }

    /// Frames currently retained.
    #[must_use]
    pub fn retained_frames(&self) -> usize {
        self.history.len()
    }

    /// Zero the marginals and forget the retained frames.
    pub fn reset(&mut self) {
        for marginal in &mut self.marginals {
            marginal.clear();
        }
        self.history.clear();
    }
}

fn fill_marginal(marginal: &mut Histogram2D, frame: &Frame, axis: Axis, window: &MarginalWindow) {
    let (row_axis, col_axis) = axis.others();
    let (r, c, w) = (row_axis.index(), col_axis.index(), axis.index());
    marginal.fill(
        frame
            .rows()
            .filter(|row| window.contains(row[w]))
            .map(|row| (row[r], row[c])),
    );
}
