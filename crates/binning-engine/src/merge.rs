//! Temporal (cross-product) bin merging.
//!
//! A [`TemporalBinMerger`] consumes N independently produced
//! [`SortedBinSequence`] inputs — typically one per input product or time
//! slice — and performs a k-way merge: at each step it selects the
//! smallest bin index across all cursors, folds every contribution at
//! that index into one accumulator, finalizes it, and emits the
//! [`FinalizedBin`]. The output is strictly ascending with each index
//! emitted exactly once, and the emitted index set is the exact union of
//! the inputs' index sets.
//!
//! The merger is a pull-based iterator: nothing downstream of the current
//! bin is materialized, so the pipeline can stream arbitrarily large
//! outputs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::aggregator::{BinAccumulator, BinAggregator};
use crate::error::{BinningError, Result};
use crate::store::{BinGroup, SortedBinSequence, SpatialBinStore};
use crate::types::FinalizedBin;

/// One input sequence plus its current head group.
struct Cursor {
    seq: SortedBinSequence,
    head: Option<BinGroup>,
}

impl Cursor {
    /// Pull the next group into `head`, enforcing strict ascent within
    /// the sequence.
    fn advance(&mut self) -> Result<()> {
        let previous = self.head.take().map(|(index, _)| index);

        match self.seq.next() {
            None => Ok(()),
            Some(Err(err)) => Err(err),
            Some(Ok(group)) => {
                if let Some(prev) = previous {
                    debug_assert!(group.0 > prev, "input sequence not strictly ascending");
                }
                self.head = Some(group);
                Ok(())
            }
        }
    }
}

/// Sorted k-way merge over per-product bin sequences.
pub struct TemporalBinMerger<'a> {
    aggregator: &'a dyn BinAggregator,
    cursors: Vec<Cursor>,
    /// Min-heap of (head index, cursor id) for O(log N) selection.
    heap: BinaryHeap<Reverse<(u64, usize)>>,
    emitted: u64,
    done: bool,
}

impl<'a> TemporalBinMerger<'a> {
    /// Create a merger over already-drained sequences.
    ///
    /// Each input's first group is pulled here, so spill read errors at
    /// the head surface immediately.
    pub fn new(inputs: Vec<SortedBinSequence>, aggregator: &'a dyn BinAggregator) -> Result<Self> {
        let mut cursors = Vec::with_capacity(inputs.len());
        let mut heap = BinaryHeap::with_capacity(inputs.len());

        for (id, seq) in inputs.into_iter().enumerate() {
            let mut cursor = Cursor { seq, head: None };
            cursor.advance()?;
            if let Some((index, _)) = cursor.head {
                heap.push(Reverse((index, id)));
            }
            cursors.push(cursor);
        }

        Ok(Self {
            aggregator,
            cursors,
            heap,
            emitted: 0,
            done: false,
        })
    }

    /// Create a merger by draining sealed stores.
    ///
    /// Fails with [`BinningError::UnsealedInput`] if any store was not
    /// sealed via `consumption_completed`.
    pub fn from_stores(
        stores: &mut [SpatialBinStore],
        aggregator: &'a dyn BinAggregator,
    ) -> Result<Self> {
        let mut inputs = Vec::with_capacity(stores.len());
        for (input, store) in stores.iter_mut().enumerate() {
            if !store.is_sealed() {
                return Err(BinningError::UnsealedInput { input });
            }
            inputs.push(store.sorted_bins()?);
        }
        Self::new(inputs, aggregator)
    }

    /// Bins emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Fold every contribution at the current minimum index and advance
    /// the cursors that supplied them.
    fn merge_step(&mut self) -> Option<Result<FinalizedBin>> {
        let Reverse((min_index, first)) = self.heap.pop()?;

        let mut contributing = vec![first];
        while let Some(&Reverse((index, id))) = self.heap.peek() {
            if index != min_index {
                break;
            }
            self.heap.pop();
            contributing.push(id);
        }

        let mut acc = BinAccumulator::new(min_index, 0);
        for id in contributing {
            let cursor = &mut self.cursors[id];
            let (_, group) = cursor
                .head
                .take()
                .unwrap_or_else(|| (min_index, Vec::new()));
            for bin in &group {
                self.aggregator.accumulate(&mut acc, bin);
            }

            if let Err(err) = cursor.advance() {
                self.done = true;
                return Some(Err(err));
            }
            if let Some((index, _)) = cursor.head {
                self.heap.push(Reverse((index, id)));
            }
        }

        // Groups are never empty, so there is always something to finalize.
        debug_assert!(acc.obs_count() > 0);
        self.emitted += 1;
        Some(self.aggregator.finalize(&acc))
    }
}

impl Iterator for TemporalBinMerger<'_> {
    type Item = Result<FinalizedBin>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.merge_step() {
            Some(item) => Some(item),
            None => {
                self.done = true;
                debug!(
                    inputs = self.cursors.len(),
                    bins = self.emitted,
                    "merge complete"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for TemporalBinMerger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalBinMerger")
            .field("inputs", &self.cursors.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}
