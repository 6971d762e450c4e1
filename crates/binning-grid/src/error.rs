//! Error types for grid indexing.

use thiserror::Error;

/// Errors that can occur while mapping between coordinates and bin indices.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// The coordinate is outside the valid geographic range.
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    OutOfRange { lat: f64, lon: f64 },

    /// The bin index does not identify a cell of this grid.
    #[error("invalid bin index {index} for grid with {num_bins} bins")]
    InvalidIndex { index: u64, num_bins: u64 },

    /// The grid parameters are unusable.
    #[error("invalid grid parameters: {0}")]
    InvalidParameters(String),
}
