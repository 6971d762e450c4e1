//! Error types for the binning engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, BinningError>;

/// Errors raised by the binning engine.
///
/// Contribution-level errors (a single bad pixel) are absorbed by the
/// pipeline and never surface through this type; product-level failures
/// are carried in the per-product run report. Everything here is either a
/// sequencing misuse or a failure of the engine's own machinery.
#[derive(Error, Debug)]
pub enum BinningError {
    /// Coordinate/index errors from the grid.
    #[error(transparent)]
    Grid(#[from] binning_grid::GridError),

    /// An accumulator was finalized without ever seeing a contribution.
    #[error("bin {index} finalized without contributions")]
    EmptyBin { index: u64 },

    /// `sorted_bins` was called on a store that was not sealed.
    #[error("store not sealed: call consumption_completed before sorted_bins")]
    NotSealed,

    /// The store was sealed and can no longer accept contributions.
    #[error("store already sealed")]
    StoreSealed,

    /// A merge input originates from a store that was never sealed.
    #[error("merge input {input} originates from an unsealed store")]
    UnsealedInput { input: usize },

    /// The disk-spill backend failed to persist or read back contributions.
    #[error("spill storage error: {0}")]
    Spill(String),

    /// An observation source failed while being read.
    #[error("source '{product}' failed: {message}")]
    Source { product: String, message: String },

    /// The output sink rejected a finalized bin.
    #[error("sink error: {0}")]
    Sink(String),

    /// The engine configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BinningError {
    /// Create a Spill error.
    pub fn spill(msg: impl Into<String>) -> Self {
        Self::Spill(msg.into())
    }

    /// Create a Source error.
    pub fn source(product: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            product: product.into(),
            message: msg.into(),
        }
    }

    /// Create a Sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for BinningError {
    fn from(err: std::io::Error) -> Self {
        Self::Spill(err.to_string())
    }
}
