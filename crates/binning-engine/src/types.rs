//! Core data types shared across the engine.

use serde::{Deserialize, Serialize};

/// One observation delivered by a product's sampling collaborator.
///
/// `values` holds one measurement per tracked band; `f32::NAN` marks a
/// band without data. An observation with `valid == false` is excluded
/// from the running statistics entirely and only counted.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub lat: f64,
    pub lon: f64,
    pub values: Vec<f32>,
    /// Statistical weight of this observation, 1.0 if unweighted.
    pub weight: f32,
    pub valid: bool,
}

impl Observation {
    /// Create a valid observation with unit weight.
    pub fn new(lat: f64, lon: f64, values: Vec<f32>) -> Self {
        Self {
            lat,
            lon,
            values,
            weight: 1.0,
            valid: true,
        }
    }
}

/// One observation's contribution to a single bin.
///
/// Created by the spatial pass, owned by exactly one store until drained
/// by iteration, immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBin {
    /// The bin this contribution falls into.
    pub index: u64,
    /// One measurement per tracked band, `f32::NAN` where no data exists.
    pub values: Vec<f32>,
    /// Statistical weight of the contribution.
    pub weight: f32,
    /// Identifier of the producing input, assigned by the producer (the
    /// pipeline uses the product ordinal).
    pub source: u32,
}

impl SpatialBin {
    /// Create a contribution with unit weight and no source tag.
    pub fn new(index: u64, values: Vec<f32>) -> Self {
        Self {
            index,
            values,
            weight: 1.0,
            source: 0,
        }
    }

    /// Create a weighted, source-tagged contribution.
    pub fn tagged(index: u64, values: Vec<f32>, weight: f32, source: u32) -> Self {
        Self {
            index,
            values,
            weight,
            source,
        }
    }
}

/// The immutable, finalized statistical result for one bin.
///
/// Produced once per bin index per run, consumed exactly once by the
/// output sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedBin {
    pub index: u64,
    /// Finalized statistic per band, `f32::NAN` where no band saw a valid
    /// sample.
    pub values: Vec<f32>,
    /// Valid samples folded into each band's statistic.
    pub valid_counts: Vec<u32>,
    /// Total contributions folded into this bin, no-data ones included.
    pub obs_count: u32,
    /// Total weight of the folded contributions.
    pub weight: f32,
}

/// A geographic bounding box used to restrict binning to a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check if a coordinate is contained within this bounding box.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Width in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        // Global coverage
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// Counters describing what a store has accepted and spilled.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Contributions consumed since creation or the last clear.
    pub contributions: u64,
    /// Distinct bin indices seen.
    pub distinct_bins: usize,
    /// Buffer flushes performed by the spill backend.
    pub flushes: u64,
    /// Bytes written to spill files.
    pub spilled_bytes: u64,
}
