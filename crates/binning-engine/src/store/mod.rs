//! Spatial bin stores.
//!
//! A store accepts batches of [`SpatialBin`] contributions in any order,
//! groups them by bin index, and — once sealed — presents the groups as a
//! [`SortedBinSequence`] in strictly ascending index order. The two
//! backends satisfy the same contract and are selected by a configuration
//! tag: memory-resident for bounded extents, disk-spill for unbounded
//! ones.
//!
//! A store has a single writer; concurrent producers use one store each
//! (see the pipeline) or synchronize externally.

mod memory;
mod spill;

pub use memory::{MemoryBinStore, MemorySequence};
pub use spill::{SpillBinStore, SpillSequence};

use std::path::Path;

use crate::config::{BinningConfig, StoreBackend};
use crate::error::{BinningError, Result};
use crate::types::{SpatialBin, StoreStats};

/// One sorted group: a bin index and every contribution that fell into it.
pub type BinGroup = (u64, Vec<SpatialBin>);

/// Spatial bin store, tagged by backend.
#[derive(Debug)]
pub enum SpatialBinStore {
    Memory(MemoryBinStore),
    Spill(SpillBinStore),
}

impl SpatialBinStore {
    /// Create the store selected by the configuration.
    pub fn from_config(config: &BinningConfig) -> Result<Self> {
        match config.store_backend {
            StoreBackend::Memory => Ok(Self::memory()),
            StoreBackend::Disk => {
                let dir = config.spill_dir.as_deref().ok_or_else(|| {
                    BinningError::config("spill_dir is required for the disk backend")
                })?;
                Self::spill(dir, config.spill_partition_span, config.spill_buffer_len)
            }
        }
    }

    /// Create a memory-resident store.
    pub fn memory() -> Self {
        Self::Memory(MemoryBinStore::new())
    }

    /// Create a disk-spill store under the given directory.
    pub fn spill(spill_dir: &Path, partition_span: u64, buffer_len: usize) -> Result<Self> {
        Ok(Self::Spill(SpillBinStore::new(
            spill_dir,
            partition_span,
            buffer_len,
        )?))
    }

    /// Append a batch of contributions to their per-index groups.
    ///
    /// Batches may arrive repeatedly and in any interleaving; the sorted
    /// output is independent of consumption order. Fails with
    /// [`BinningError::StoreSealed`] once the store is sealed.
    pub fn consume(&mut self, bins: Vec<SpatialBin>) -> Result<()> {
        match self {
            Self::Memory(store) => store.consume(bins),
            Self::Spill(store) => store.consume(bins),
        }
    }

    /// Mark the store read-only. Called exactly once after the last
    /// `consume`; the spill backend persists buffered data here.
    pub fn consumption_completed(&mut self) -> Result<()> {
        match self {
            Self::Memory(store) => store.consumption_completed(),
            Self::Spill(store) => store.consumption_completed(),
        }
    }

    /// Drain the store into a forward-only, strictly ascending sequence
    /// of bin groups. Fails with [`BinningError::NotSealed`] before
    /// [`SpatialBinStore::consumption_completed`].
    pub fn sorted_bins(&mut self) -> Result<SortedBinSequence> {
        match self {
            Self::Memory(store) => Ok(SortedBinSequence::Memory(store.sorted_bins()?)),
            Self::Spill(store) => Ok(SortedBinSequence::Spill(store.sorted_bins()?)),
        }
    }

    /// Number of distinct bin indices currently held.
    pub fn len(&self) -> usize {
        match self {
            Self::Memory(store) => store.len(),
            Self::Spill(store) => store.len(),
        }
    }

    /// Whether the store holds no contributions.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Memory(store) => store.is_empty(),
            Self::Spill(store) => store.is_empty(),
        }
    }

    /// Whether the store was sealed.
    pub fn is_sealed(&self) -> bool {
        match self {
            Self::Memory(store) => store.is_sealed(),
            Self::Spill(store) => store.is_sealed(),
        }
    }

    /// Store counters.
    pub fn stats(&self) -> StoreStats {
        match self {
            Self::Memory(store) => store.stats(),
            Self::Spill(store) => store.stats(),
        }
    }

    /// Release all owned contributions and return to the initial empty,
    /// writable state, undoing a prior seal.
    pub fn clear(&mut self) -> Result<()> {
        match self {
            Self::Memory(store) => {
                store.clear();
                Ok(())
            }
            Self::Spill(store) => store.clear(),
        }
    }
}

/// Forward-only, strictly-ascending-by-index sequence of bin groups.
///
/// Produced once per store seal cycle; no index appears twice. The spill
/// variant can surface read errors mid-stream, after which the sequence
/// is fused.
#[derive(Debug)]
pub enum SortedBinSequence {
    Memory(MemorySequence),
    Spill(SpillSequence),
}

impl Iterator for SortedBinSequence {
    type Item = Result<BinGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Memory(seq) => seq.next(),
            Self::Spill(seq) => seq.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(index: u64) -> SpatialBin {
        SpatialBin::new(index, vec![index as f32])
    }

    fn spill_store(dir: &Path) -> SpatialBinStore {
        // Tiny partitions and buffers so tests exercise flushing.
        SpatialBinStore::spill(dir, 4, 2).unwrap()
    }

    fn drain(store: &mut SpatialBinStore) -> Vec<BinGroup> {
        store
            .sorted_bins()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    /// Runs the full §-contract scenario against one store.
    fn check_grouping_scenario(mut store: SpatialBinStore) {
        store
            .consume(vec![contribution(5), contribution(2)])
            .unwrap();
        store
            .consume(vec![contribution(5), contribution(9), contribution(2)])
            .unwrap();
        store.consumption_completed().unwrap();

        assert_eq!(store.len(), 3);

        let groups = drain(&mut store);
        let shape: Vec<(u64, usize)> = groups.iter().map(|(i, g)| (*i, g.len())).collect();
        assert_eq!(shape, vec![(2, 2), (5, 2), (9, 1)]);

        // Every contribution landed in the group of its own index.
        for (index, group) in &groups {
            assert!(group.iter().all(|b| b.index == *index));
        }
    }

    #[test]
    fn test_memory_groups_and_sorts() {
        check_grouping_scenario(SpatialBinStore::memory());
    }

    #[test]
    fn test_spill_groups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        check_grouping_scenario(spill_store(dir.path()));
    }

    #[test]
    fn test_sorted_bins_before_seal_fails() {
        let mut store = SpatialBinStore::memory();
        store.consume(vec![contribution(1)]).unwrap();
        assert!(matches!(
            store.sorted_bins(),
            Err(BinningError::NotSealed)
        ));

        let dir = tempfile::tempdir().unwrap();
        let mut store = spill_store(dir.path());
        store.consume(vec![contribution(1)]).unwrap();
        assert!(matches!(
            store.sorted_bins(),
            Err(BinningError::NotSealed)
        ));
    }

    #[test]
    fn test_consume_after_seal_fails() {
        let mut store = SpatialBinStore::memory();
        store.consumption_completed().unwrap();
        assert!(matches!(
            store.consume(vec![contribution(1)]),
            Err(BinningError::StoreSealed)
        ));
        assert!(matches!(
            store.consumption_completed(),
            Err(BinningError::StoreSealed)
        ));
    }

    #[test]
    fn test_consumption_order_independence() {
        let contributions: Vec<u64> = vec![17, 3, 3, 250, 8, 17, 1, 999, 8, 8];

        let batchings: Vec<Vec<Vec<u64>>> = vec![
            vec![contributions.clone()],
            contributions.iter().map(|&i| vec![i]).collect(),
            vec![
                contributions[..3].to_vec(),
                contributions[3..7].to_vec(),
                contributions[7..].to_vec(),
            ],
            {
                let mut reversed = contributions.clone();
                reversed.reverse();
                vec![reversed]
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let mut reference: Option<Vec<(u64, usize)>> = None;

        for batches in &batchings {
            for mut store in [SpatialBinStore::memory(), spill_store(dir.path())] {
                for batch in batches {
                    store
                        .consume(batch.iter().map(|&i| contribution(i)).collect())
                        .unwrap();
                }
                store.consumption_completed().unwrap();

                let shape: Vec<(u64, usize)> = drain(&mut store)
                    .iter()
                    .map(|(i, g)| (*i, g.len()))
                    .collect();

                match &reference {
                    None => reference = Some(shape),
                    Some(expected) => assert_eq!(&shape, expected),
                }
            }
        }
    }

    #[test]
    fn test_output_strictly_ascending() {
        let dir = tempfile::tempdir().unwrap();
        for mut store in [SpatialBinStore::memory(), spill_store(dir.path())] {
            let indices = [42u64, 7, 7, 0, 1000, 13, 42, 5, 6, 7, 8, 9];
            store
                .consume(indices.iter().map(|&i| contribution(i)).collect())
                .unwrap();
            store.consumption_completed().unwrap();

            let groups = drain(&mut store);
            for pair in groups.windows(2) {
                assert!(pair[0].0 < pair[1].0);
            }
        }
    }

    #[test]
    fn test_clear_resets_for_reuse() {
        let dir = tempfile::tempdir().unwrap();
        for mut store in [SpatialBinStore::memory(), spill_store(dir.path())] {
            store
                .consume(vec![contribution(3), contribution(1)])
                .unwrap();
            store.consumption_completed().unwrap();
            assert!(!store.is_empty());

            store.clear().unwrap();
            assert!(store.is_empty());
            assert_eq!(store.len(), 0);
            assert!(!store.is_sealed());

            // A fresh consume/seal cycle works after clear.
            store.consume(vec![contribution(11)]).unwrap();
            store.consumption_completed().unwrap();
            let groups = drain(&mut store);
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].0, 11);
        }
    }

    #[test]
    fn test_spill_clear_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = spill_store(dir.path());

        store
            .consume((0..32).map(contribution).collect::<Vec<_>>())
            .unwrap();
        store.consumption_completed().unwrap();

        let spill_path = match &store {
            SpatialBinStore::Spill(s) => s.spill_path().to_path_buf(),
            _ => unreachable!("spill store expected"),
        };
        assert!(spill_path.exists());
        assert!(std::fs::read_dir(&spill_path).unwrap().next().is_some());

        store.clear().unwrap();
        assert!(!spill_path.exists());
    }

    #[test]
    fn test_backends_agree() {
        let dir = tempfile::tempdir().unwrap();
        let indices = [900u64, 3, 3, 17, 0, 900, 21, 4, 4, 4, 512, 513];

        let mut memory = SpatialBinStore::memory();
        let mut spill = spill_store(dir.path());
        for store in [&mut memory, &mut spill] {
            store
                .consume(indices.iter().map(|&i| contribution(i)).collect())
                .unwrap();
            store.consumption_completed().unwrap();
        }

        let from_memory = drain(&mut memory);
        let from_spill = drain(&mut spill);
        assert_eq!(from_memory.len(), from_spill.len());
        for (a, b) in from_memory.iter().zip(&from_spill) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1.len(), b.1.len());
        }
    }

    #[test]
    fn test_spill_stats_track_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = spill_store(dir.path());

        store
            .consume((0..16).map(contribution).collect::<Vec<_>>())
            .unwrap();
        store.consumption_completed().unwrap();

        let stats = store.stats();
        assert_eq!(stats.contributions, 16);
        assert_eq!(stats.distinct_bins, 16);
        assert!(stats.flushes > 0);
        assert!(stats.spilled_bytes > 0);
    }

    #[test]
    fn test_empty_store_yields_empty_sequence() {
        let mut store = SpatialBinStore::memory();
        store.consumption_completed().unwrap();
        assert!(drain(&mut store).is_empty());
    }
}
