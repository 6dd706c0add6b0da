//! Hit axes and the windows that integrate them out.

use speem_core::frame::{T, X, Y};

/// One of the three hit axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    T,
}

impl Axis {
    /// All axes in column order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::T];

    /// Frame column of this axis.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Axis::X => X,
            Axis::Y => Y,
            Axis::T => T,
        }
    }

    /// Axis for a frame column.
    ///
    /// # Errors
    /// Returns an error for any index other than 0, 1 or 2.
    pub fn from_index(index: usize) -> speem_core::Result<Self> {
        match index {
            X => Ok(Axis::X),
            Y => Ok(Axis::Y),
            T => Ok(Axis::T),
            other => Err(speem_core::Error::InvalidAxis(other)),
        }
    }

    /// The two remaining axes in column order; these span the marginal that
    /// integrates this axis out.
    #[must_use]
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::T),
            Axis::Y => (Axis::X, Axis::T),
            Axis::T => (Axis::X, Axis::Y),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::T => "t",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open range `[low, high)` in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginalWindow {
    low: f64,
    high: f64,
}

impl MarginalWindow {
    /// Creates a window, swapping the bounds if they arrive reversed.
    #[must_use]
    pub fn new(low: f64, high: f64) -> Self {
        if high < low {
            Self {
                low: high,
                high: low,
            }
        } else {
            Self { low, high }
        }
    }

    /// A window containing every finite value.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
        }
    }

    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns true if `low <= value < high`.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value < self.high
    }
}

impl Default for MarginalWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_index_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_index(axis.index()).unwrap(), axis);
        }
        assert!(Axis::from_index(3).is_err());
    }

    #[test]
    fn test_others() {
        assert_eq!(Axis::X.others(), (Axis::Y, Axis::T));
        assert_eq!(Axis::Y.others(), (Axis::X, Axis::T));
        assert_eq!(Axis::T.others(), (Axis::X, Axis::Y));
    }

    #[test]
    fn test_window_half_open_and_swapped() {
        let window = MarginalWindow::new(5.0, -5.0);
        assert_eq!((window.low(), window.high()), (-5.0, 5.0));
        assert!(window.contains(-5.0));
        assert!(window.contains(4.999));
        assert!(!window.contains(5.0));
        assert!(!window.contains(f64::NAN));
    }

    #[test]
    fn test_unbounded_contains_finite() {
        let window = MarginalWindow::default();
        assert!(window.contains(0.0));
        assert!(window.contains(-1e300));
        assert!(!window.contains(f64::INFINITY));
    }
}
