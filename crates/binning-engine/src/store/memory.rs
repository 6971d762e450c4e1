//! Memory-resident spatial bin store.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::error::{BinningError, Result};
use crate::store::BinGroup;
use crate::types::{SpatialBin, StoreStats};

/// Spatial bin store that keeps every group in an ordered in-memory map.
///
/// The map is keyed by bin index, so entries sort on the fly and
/// iteration order is index order regardless of consumption order.
/// Suitable for bounded extents; unbounded runs use the spill backend.
#[derive(Debug, Default)]
pub struct MemoryBinStore {
    groups: BTreeMap<u64, Vec<SpatialBin>>,
    contributions: u64,
    sealed: bool,
}

impl MemoryBinStore {
    /// Create an empty, writable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append contributions to their per-index groups.
    pub fn consume(&mut self, bins: Vec<SpatialBin>) -> Result<()> {
        if self.sealed {
            return Err(BinningError::StoreSealed);
        }

        self.contributions += bins.len() as u64;
        for bin in bins {
            self.groups.entry(bin.index).or_default().push(bin);
        }
        Ok(())
    }

    /// Seal the store; no further contributions are accepted.
    pub fn consumption_completed(&mut self) -> Result<()> {
        if self.sealed {
            return Err(BinningError::StoreSealed);
        }
        self.sealed = true;
        Ok(())
    }

    /// Drain the store into an index-ordered sequence of groups.
    pub fn sorted_bins(&mut self) -> Result<MemorySequence> {
        if !self.sealed {
            return Err(BinningError::NotSealed);
        }

        let groups = std::mem::take(&mut self.groups);
        Ok(MemorySequence {
            iter: groups.into_iter(),
        })
    }

    /// Number of distinct bin indices currently held.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the store holds no contributions.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether the store was sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Store counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            contributions: self.contributions,
            distinct_bins: self.groups.len(),
            ..StoreStats::default()
        }
    }

    /// Release all contributions and return to the initial writable state.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.contributions = 0;
        self.sealed = false;
    }
}

/// Forward-only sequence over a drained memory store.
#[derive(Debug)]
pub struct MemorySequence {
    iter: btree_map::IntoIter<u64, Vec<SpatialBin>>,
}

impl Iterator for MemorySequence {
    type Item = Result<BinGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(Ok)
    }
}
