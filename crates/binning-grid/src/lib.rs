//! Global equal-area binning grid.
//!
//! Maps geographic coordinates onto a fixed global grid of latitude bands,
//! each band subdivided into longitude cells sized so that cell areas are
//! approximately equal. Every cell is identified by a single `u64` bin
//! index that sorts by band, then by cell within the band.

mod error;
mod isin;

pub use error::GridError;
pub use isin::{CellBounds, EdgeRule, GridCell, IsinGrid, DEFAULT_NUM_ROWS};

/// Result type alias for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
