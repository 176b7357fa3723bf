//! Error types for petri-automaton.

use thiserror::Error;

/// Result type for automaton operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by grid and fragment operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A coordinate fell outside the grid.
    #[error("cell ({x}, {y}) is outside a {width}x{height} grid")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    /// A grid was requested with an unusable size.
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// A replacement grid or column did not match the fragment height.
    #[error("height mismatch: expected {expected}, got {actual}")]
    HeightMismatch { expected: usize, actual: usize },
}
