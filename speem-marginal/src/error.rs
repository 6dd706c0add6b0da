//! Error types for the marginal histograms.

use thiserror::Error;

/// Result type for marginal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Marginal histogram error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Bin edges that are too short, not ascending or not finite.
    #[error("invalid bin edges: {0}")]
    InvalidEdges(String),

    /// Replacement edges with a different bin count.
    #[error("edge count mismatch: expected {expected}, got {actual}")]
    EdgeCountMismatch { expected: usize, actual: usize },

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] speem_core::Error),
}
