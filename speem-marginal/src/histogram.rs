//! Dense 2D histograms with explicit bin edges.

use crate::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis as NdAxis, Zip};

/// The two grid dimensions of a [`Histogram2D`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAxis {
    Rows,
    Cols,
}

impl GridAxis {
    fn nd(self) -> NdAxis {
        match self {
            GridAxis::Rows => NdAxis(0),
            GridAxis::Cols => NdAxis(1),
        }
    }
}

/// Counts over two physical axes.
///
/// Bins are half-open `[e[i], e[i + 1])` except the last, which also
/// includes its right edge. Values outside the edges, and NaN, are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    counts: Array2<f64>,
    row_edges: Vec<f64>,
    col_edges: Vec<f64>,
}

impl Histogram2D {
    /// Creates an empty histogram.
    ///
    /// # Errors
    /// Returns an error if either edge list has fewer than two values, or is
    /// not finite and strictly ascending.
    pub fn new(row_edges: Vec<f64>, col_edges: Vec<f64>) -> Result<Self> {
        validate_edges(&row_edges)?;
        validate_edges(&col_edges)?;
        Ok(Self {
            counts: Array2::zeros((row_edges.len() - 1, col_edges.len() - 1)),
            row_edges,
            col_edges,
        })
    }

    /// An empty histogram with the same edges.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            counts: Array2::zeros(self.counts.raw_dim()),
            row_edges: self.row_edges.clone(),
            col_edges: self.col_edges.clone(),
        }
    }

    /// `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.counts.dim()
    }

    #[must_use]
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    #[must_use]
    pub fn row_edges(&self) -> &[f64] {
        &self.row_edges
    }

    #[must_use]
    pub fn col_edges(&self) -> &[f64] {
        &self.col_edges
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    /// Add one count per `(row_value, col_value)` pair.
    pub fn fill<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        for (row_value, col_value) in values {
            if let (Some(row), Some(col)) = (
                bin_index(&self.row_edges, row_value),
                bin_index(&self.col_edges, col_value),
            ) {
                self.counts[[row, col]] += 1.0;
            }
        }
    }

    /// Add another histogram's counts. Edges are assumed identical.
    pub fn add(&mut self, other: &Histogram2D) {
        Zip::from(&mut self.counts)
            .and(&other.counts)
            .for_each(|a, &b| *a += b);
    }

    /// Zero every bin.
    pub fn clear(&mut self) {
        self.counts.fill(0.0);
    }

    /// Sum out `summed`: summing over rows yields one value per column and
    /// vice versa.
    #[must_use]
    pub fn project(&self, summed: GridAxis) -> Array1<f64> {
        self.counts.sum_axis(summed.nd())
    }

    /// A copy without the outermost bin on every side, where out-of-range
    /// hits pile up. `None` if either dimension has fewer than three bins.
    #[must_use]
    pub fn trimmed(&self) -> Option<Self> {
        let (rows, cols) = self.shape();
        if rows < 3 || cols < 3 {
            return None;
        }
        Some(Self {
            counts: self.counts.slice(s![1..rows - 1, 1..cols - 1]).to_owned(),
            row_edges: self.row_edges[1..rows].to_vec(),
            col_edges: self.col_edges[1..cols].to_vec(),
        })
    }

    /// Relabel the column axis without touching the counts.
    ///
    /// # Errors
    /// Returns an error if the edges are invalid or the bin count changes.
    pub fn set_col_edges(&mut self, edges: Vec<f64>) -> Result<()> {
        validate_edges(&edges)?;
        if edges.len() != self.col_edges.len() {
            return Err(Error::EdgeCountMismatch {
                expected: self.col_edges.len(),
                actual: edges.len(),
            });
        }
        self.col_edges = edges;
        Ok(())
    }
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::InvalidEdges(format!(
            "need at least 2 edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(Error::InvalidEdges("edges must be finite".into()));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::InvalidEdges("edges must be strictly ascending".into()));
    }
    Ok(())
}

/// Bin holding `value`, following `numpy.histogram` edge rules.
#[inline]
#[must_use]
pub fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    let (&first, &last) = (edges.first()?, edges.last()?);
    if !(first..=last).contains(&value) {
        return None;
    }
    if value >= last {
        return Some(edges.len() - 2);
    }
    Some(edges.partition_point(|&e| e <= value) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(n: usize) -> Vec<f64> {
        (0..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_bin_index_edges() {
        let e = edges(4);
        assert_eq!(bin_index(&e, 0.0), Some(0));
        assert_eq!(bin_index(&e, 0.999), Some(0));
        assert_eq!(bin_index(&e, 1.0), Some(1));
        assert_eq!(bin_index(&e, 4.0), Some(3));
        assert_eq!(bin_index(&e, 4.0001), None);
        assert_eq!(bin_index(&e, -0.1), None);
        assert_eq!(bin_index(&e, f64::NAN), None);
    }

    #[test]
    fn test_fill_and_project() {
        let mut hist = Histogram2D::new(edges(2), edges(3)).unwrap();
        hist.fill([(0.5, 0.5), (0.5, 2.5), (1.5, 2.5), (9.0, 0.0)]);
        assert_eq!(hist.shape(), (2, 3));
        assert!((hist.total() - 3.0).abs() < f64::EPSILON);
        assert_eq!(hist.project(GridAxis::Rows).to_vec(), vec![1.0, 0.0, 2.0]);
        assert_eq!(hist.project(GridAxis::Cols).to_vec(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_trimmed_drops_outer_bins() {
        let mut hist = Histogram2D::new(edges(4), edges(3)).unwrap();
        hist.fill([(0.5, 0.5), (1.5, 1.5), (2.5, 1.5), (3.5, 2.5), (4.0, 3.0)]);

        let inner = hist.trimmed().unwrap();
        assert_eq!(inner.shape(), (2, 1));
        assert_eq!(inner.row_edges(), &[1.0, 2.0, 3.0]);
        assert_eq!(inner.col_edges(), &[1.0, 2.0]);
        assert_eq!(inner.counts().iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0]);
        assert!((hist.total() - 5.0).abs() < f64::EPSILON);

        assert!(Histogram2D::new(edges(2), edges(3)).unwrap().trimmed().is_none());
    }

    #[test]
    fn test_add_and_clear() {
        let mut a = Histogram2D::new(edges(2), edges(2)).unwrap();
        let mut b = a.empty_like();
        a.fill([(0.5, 0.5)]);
        b.fill([(0.5, 0.5), (1.5, 1.5)]);
        a.add(&b);
        assert!((a.counts()[[0, 0]] - 2.0).abs() < f64::EPSILON);
        assert!((a.total() - 3.0).abs() < f64::EPSILON);
        a.clear();
        assert!(a.total().abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_edges() {
        assert!(Histogram2D::new(vec![0.0], edges(2)).is_err());
        assert!(Histogram2D::new(vec![0.0, 0.0], edges(2)).is_err());
        assert!(Histogram2D::new(vec![0.0, f64::NAN], edges(2)).is_err());
    }

    #[test]
    fn test_set_col_edges_keeps_counts() {
        let mut hist = Histogram2D::new(edges(2), edges(2)).unwrap();
        hist.fill([(0.5, 0.5)]);
        hist.set_col_edges(vec![10.0, 11.0, 12.0]).unwrap();
        assert_eq!(hist.col_edges(), &[10.0, 11.0, 12.0]);
        assert!((hist.total() - 1.0).abs() < f64::EPSILON);
        assert!(hist.set_col_edges(edges(3)).is_err());
    }
}
