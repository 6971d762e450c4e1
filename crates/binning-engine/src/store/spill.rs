//! Disk-spill spatial bin store.
//!
//! Contributions are range-partitioned by bin index into append-only
//! record files under a per-store temporary directory. Sorting is
//! deferred to consumption time: each partition covers a disjoint,
//! ascending index range, so loading one partition at a time into an
//! ordered map yields a globally sorted sequence while bounding memory
//! by the largest partition.
//!
//! The record encoding is internal to this module and never part of the
//! engine's public surface.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{BinningError, Result};
use crate::store::BinGroup;
use crate::types::{SpatialBin, StoreStats};

/// Upper bound on bands per record; anything larger marks a corrupt file.
const MAX_BANDS: usize = 1 << 16;

/// Spatial bin store that spills contributions to partitioned files.
///
/// Write path: contributions are buffered per partition and appended to
/// the partition's file once the buffer fills; sealing flushes every
/// remaining buffer. Read path: partitions are loaded one at a time, in
/// ascending range order, and their groups are yielded in index order.
pub struct SpillBinStore {
    /// Directory the per-store spill directory is created in.
    parent_dir: PathBuf,
    dir: Arc<TempDir>,
    partition_span: u64,
    buffer_len: usize,
    buffers: BTreeMap<u64, Vec<SpatialBin>>,
    writers: BTreeMap<u64, BufWriter<File>>,
    partition_paths: BTreeMap<u64, PathBuf>,
    indices: HashSet<u64>,
    contributions: u64,
    flushes: u64,
    spilled_bytes: u64,
    sealed: bool,
}

impl SpillBinStore {
    /// Create a store spilling into a fresh directory under `spill_dir`.
    ///
    /// `partition_span` is the count of bin indices covered by one
    /// partition file; `buffer_len` the contributions buffered per
    /// partition before a flush.
    pub fn new(spill_dir: &Path, partition_span: u64, buffer_len: usize) -> Result<Self> {
        std::fs::create_dir_all(spill_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("bin-spill-")
            .tempdir_in(spill_dir)?;

        Ok(Self {
            parent_dir: spill_dir.to_path_buf(),
            dir: Arc::new(dir),
            partition_span,
            buffer_len,
            buffers: BTreeMap::new(),
            writers: BTreeMap::new(),
            partition_paths: BTreeMap::new(),
            indices: HashSet::new(),
            contributions: 0,
            flushes: 0,
            spilled_bytes: 0,
            sealed: false,
        })
    }

    /// The directory this store spills into.
    pub fn spill_path(&self) -> &Path {
        self.dir.path()
    }

    /// Append contributions, spilling any partition whose buffer fills.
    pub fn consume(&mut self, bins: Vec<SpatialBin>) -> Result<()> {
        if self.sealed {
            return Err(BinningError::StoreSealed);
        }

        self.contributions += bins.len() as u64;
        for bin in bins {
            self.indices.insert(bin.index);
            let partition = bin.index / self.partition_span;
            let buffer = self.buffers.entry(partition).or_default();
            buffer.push(bin);

            if buffer.len() >= self.buffer_len {
                self.flush_partition(partition)?;
            }
        }
        Ok(())
    }

    /// Seal the store, persisting every buffered contribution.
    pub fn consumption_completed(&mut self) -> Result<()> {
        if self.sealed {
            return Err(BinningError::StoreSealed);
        }

        let pending: Vec<u64> = self
            .buffers
            .iter()
            .filter(|(_, buf)| !buf.is_empty())
            .map(|(&p, _)| p)
            .collect();
        for partition in pending {
            self.flush_partition(partition)?;
        }

        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        self.writers.clear();
        self.sealed = true;

        debug!(
            partitions = self.partition_paths.len(),
            spilled_bytes = self.spilled_bytes,
            "spill store sealed"
        );
        Ok(())
    }

    /// Drain the store into an index-ordered sequence of groups.
    pub fn sorted_bins(&mut self) -> Result<SpillSequence> {
        if !self.sealed {
            return Err(BinningError::NotSealed);
        }

        let partitions = std::mem::take(&mut self.partition_paths);
        self.indices.clear();

        Ok(SpillSequence {
            partitions: partitions.into_values().collect(),
            current: BTreeMap::new().into_iter(),
            _dir: Arc::clone(&self.dir),
        })
    }

    /// Number of distinct bin indices currently held.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the store holds no contributions.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the store was sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Store counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            contributions: self.contributions,
            distinct_bins: self.indices.len(),
            flushes: self.flushes,
            spilled_bytes: self.spilled_bytes,
        }
    }

    /// Release all contributions and spill files and return to the
    /// initial writable state.
    pub fn clear(&mut self) -> Result<()> {
        self.writers.clear();
        self.buffers.clear();
        self.partition_paths.clear();
        self.indices.clear();
        self.contributions = 0;
        self.flushes = 0;
        self.spilled_bytes = 0;
        self.sealed = false;

        // Swapping in a fresh directory drops the old one (and its files)
        // once no outstanding sequence holds it.
        let dir = tempfile::Builder::new()
            .prefix("bin-spill-")
            .tempdir_in(&self.parent_dir)?;
        self.dir = Arc::new(dir);
        Ok(())
    }

    /// Append one partition's buffered contributions to its file.
    fn flush_partition(&mut self, partition: u64) -> Result<()> {
        let buffer = match self.buffers.get_mut(&partition) {
            Some(buffer) if !buffer.is_empty() => std::mem::take(buffer),
            _ => return Ok(()),
        };

        let mut encoded = BytesMut::new();
        for bin in &buffer {
            encode_record(&mut encoded, bin);
        }

        if !self.writers.contains_key(&partition) {
            let path = self.dir.path().join(format!("part-{:08}.spill", partition));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.partition_paths.insert(partition, path);
            self.writers.insert(partition, BufWriter::new(file));
        }
        let writer = self
            .writers
            .get_mut(&partition)
            .ok_or_else(|| BinningError::spill("partition writer missing"))?;

        writer.write_all(&encoded)?;
        self.flushes += 1;
        self.spilled_bytes += encoded.len() as u64;

        debug!(
            partition,
            records = buffer.len(),
            bytes = encoded.len(),
            "flushed spill partition"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SpillBinStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillBinStore")
            .field("dir", &self.dir.path())
            .field("partition_span", &self.partition_span)
            .field("contributions", &self.contributions)
            .field("distinct_bins", &self.indices.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}

/// Forward-only sequence over a drained spill store.
///
/// Holds the spill directory alive until fully consumed, so a store may
/// be cleared or dropped while its sequence is still being merged.
pub struct SpillSequence {
    partitions: VecDeque<PathBuf>,
    current: std::collections::btree_map::IntoIter<u64, Vec<SpatialBin>>,
    _dir: Arc<TempDir>,
}

impl Iterator for SpillSequence {
    type Item = Result<BinGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(group) = self.current.next() {
                return Some(Ok(group));
            }

            let path = self.partitions.pop_front()?;
            match load_partition(&path) {
                Ok(groups) => self.current = groups.into_iter(),
                Err(err) => {
                    // Fuse the sequence; a partially read partition must
                    // not leak groups out of order.
                    self.partitions.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::fmt::Debug for SpillSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillSequence")
            .field("pending_partitions", &self.partitions.len())
            .finish()
    }
}

/// Read one partition file back into an ordered group map.
fn load_partition(path: &Path) -> Result<BTreeMap<u64, Vec<SpatialBin>>> {
    let raw = std::fs::read(path)
        .map_err(|e| BinningError::spill(format!("{}: {}", path.display(), e)))?;
    let mut buf = Bytes::from(raw);

    let mut groups: BTreeMap<u64, Vec<SpatialBin>> = BTreeMap::new();
    while buf.has_remaining() {
        let bin = decode_record(&mut buf)
            .map_err(|e| BinningError::spill(format!("{}: {}", path.display(), e)))?;
        groups.entry(bin.index).or_default().push(bin);
    }
    Ok(groups)
}

/// Fixed little-endian framing: index, source, weight, band count, bands.
fn encode_record(buf: &mut BytesMut, bin: &SpatialBin) {
    buf.put_u64_le(bin.index);
    buf.put_u32_le(bin.source);
    buf.put_f32_le(bin.weight);
    buf.put_u32_le(bin.values.len() as u32);
    for &value in &bin.values {
        buf.put_f32_le(value);
    }
}

fn decode_record(buf: &mut Bytes) -> std::result::Result<SpatialBin, String> {
    const HEADER_LEN: usize = 8 + 4 + 4 + 4;
    if buf.remaining() < HEADER_LEN {
        return Err("truncated record header".to_string());
    }

    let index = buf.get_u64_le();
    let source = buf.get_u32_le();
    let weight = buf.get_f32_le();
    let num_bands = buf.get_u32_le() as usize;

    if num_bands > MAX_BANDS {
        return Err(format!("corrupt record: {} bands", num_bands));
    }
    if buf.remaining() < num_bands * 4 {
        return Err("truncated record payload".to_string());
    }

    let mut values = Vec::with_capacity(num_bands);
    for _ in 0..num_bands {
        values.push(buf.get_f32_le());
    }

    Ok(SpatialBin {
        index,
        values,
        weight,
        source,
    })
}
