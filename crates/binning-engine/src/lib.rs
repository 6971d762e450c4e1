//! Spatial/temporal binning engine.
//!
//! Turns unordered streams of per-observation contributions into a sorted
//! sequence of finalized bins on a fixed global grid:
//!
//! 1. A [`pipeline::BinningPipeline`] indexes each observation of an input
//!    product onto the grid (via [`binning_grid::IsinGrid`]) and feeds the
//!    resulting [`SpatialBin`] contributions into a per-product
//!    [`store::SpatialBinStore`].
//! 2. Each sealed store presents its contributions as a
//!    [`store::SortedBinSequence`], grouped by bin index in strictly
//!    ascending order regardless of consumption order.
//! 3. The [`merge::TemporalBinMerger`] k-way merges the per-product
//!    sequences, folds all contributions sharing a bin index into one
//!    accumulator via the configured [`aggregator::BinAggregator`], and
//!    emits each [`FinalizedBin`] exactly once, in ascending index order.
//!
//! Product decoding and output persistence stay outside the engine, behind
//! the [`pipeline::ObservationSource`] and [`pipeline::BinSink`] traits.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod store;
mod types;

pub use config::{AggregationPolicy, BinningConfig, StoreBackend};
pub use error::{BinningError, Result};
pub use types::{BoundingBox, FinalizedBin, Observation, SpatialBin, StoreStats};
