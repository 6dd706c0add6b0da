//! Frames: all hits collected during one integration window.
//!
//! A frame is an `N x 3` array with columns `(x, y, t)`. Raw frames hold
//! detector bins; converted frames hold millimetres and nanoseconds. Row
//! order is insertion order across batches, and each batch keeps the hit
//! order of its packet.

use crate::{Error, HitBatch, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Column index of the x coordinate.
pub const X: usize = 0;
/// Column index of the y coordinate.
pub const Y: usize = 1;
/// Column index of the time coordinate.
pub const T: usize = 2;

/// Frame of raw `(x_bin, y_bin, t_bin)` triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Array2<u16>,
}

impl RawFrame {
    /// Creates an empty `0 x 3` frame.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Array2::zeros((0, 3)),
        }
    }

    /// Wraps an existing array.
    ///
    /// # Errors
    /// Returns an error if the array does not have exactly three columns.
    pub fn from_array(data: Array2<u16>) -> Result<Self> {
        if data.ncols() != 3 {
            return Err(Error::InvalidFrameShape(data.ncols()));
        }
        Ok(Self { data })
    }

    /// Concatenates batches in the order given.
    #[must_use]
    pub fn from_batches(batches: &[HitBatch]) -> Self {
        let total: usize = batches.iter().map(HitBatch::len).sum();
        let mut flat = Vec::with_capacity(total * 3);
        for batch in batches {
            for hit in &batch.hits {
                flat.extend_from_slice(&hit.as_row());
            }
        }
        // Length is total * 3 by construction.
        let data = Array2::from_shape_vec((total, 3), flat)
            .unwrap_or_else(|_| Array2::zeros((0, 3)));
        Self { data }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// Returns true if the frame holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Returns a view of the underlying array.
    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, u16> {
        self.data.view()
    }

    /// Returns one column of the frame.
    #[must_use]
    pub fn column(&self, index: usize) -> ArrayView1<'_, u16> {
        self.data.index_axis(Axis(1), index)
    }

    /// Consumes the frame, returning the array.
    #[must_use]
    pub fn into_array(self) -> Array2<u16> {
        self.data
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::empty()
    }
}

/// Frame of physical `(x_mm, y_mm, t_ns)` triples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Array2<f64>,
}

impl Frame {
    /// Creates an empty `0 x 3` frame.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Array2::zeros((0, 3)),
        }
    }

    /// Wraps an existing array.
    ///
    /// # Errors
    /// Returns an error if the array does not have exactly three columns.
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        if data.ncols() != 3 {
            return Err(Error::InvalidFrameShape(data.ncols()));
        }
        Ok(Self { data })
    }

    /// Builds a frame from `(x, y, t)` rows.
    #[must_use]
    pub fn from_rows(rows: &[[f64; 3]]) -> Self {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((rows.len(), 3), flat)
            .unwrap_or_else(|_| Array2::zeros((0, 3)));
        Self { data }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// Returns true if the frame holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Returns a view of the underlying array.
    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Returns one column of the frame.
    #[must_use]
    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.index_axis(Axis(1), index)
    }

    /// Iterates over rows as `[x, y, t]`.
    pub fn rows(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        self.data.rows().into_iter().map(|r| [r[X], r[Y], r[T]])
    }

    /// Consumes the frame, returning the array.
    #[must_use]
    pub fn into_array(self) -> Array2<f64> {
        self.data
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}
