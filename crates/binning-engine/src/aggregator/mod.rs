//! Per-bin aggregation policies.
//!
//! A [`BinAggregator`] folds [`SpatialBin`] contributions into a mutable
//! [`BinAccumulator`] and finalizes the accumulator into one
//! [`FinalizedBin`]. Accumulation is associative and commutative (up to
//! floating-point rounding), so contributions sharing a bin index may
//! arrive from independent sources in any order. `f32::NAN` is the
//! no-data sentinel: it never enters the running statistic but the
//! contribution is still counted.

use crate::config::AggregationPolicy;
use crate::error::{BinningError, Result};
use crate::types::{FinalizedBin, SpatialBin};

/// Running per-band state of one accumulator.
///
/// The interpretation of `stat` belongs to the policy that owns the
/// accumulator: a weighted sum for the mean policy, a running extremum
/// for min/max.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandState {
    pub stat: f64,
    /// Accumulated weight of valid samples (mean policy only).
    pub weight: f64,
    /// Valid samples folded into this band.
    pub valid_count: u32,
}

/// Mutable running aggregate for one bin.
///
/// Owned exclusively by the store entry or merge step operating on it;
/// never shared across bins.
#[derive(Debug, Clone, PartialEq)]
pub struct BinAccumulator {
    index: u64,
    obs_count: u32,
    weight_sum: f64,
    bands: Vec<BandState>,
}

impl BinAccumulator {
    /// Create an empty accumulator for the given bin.
    pub fn new(index: u64, num_bands: usize) -> Self {
        Self {
            index,
            obs_count: 0,
            weight_sum: 0.0,
            bands: vec![BandState::default(); num_bands],
        }
    }

    /// The bin this accumulator aggregates.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Contributions folded in so far.
    pub fn obs_count(&self) -> u32 {
        self.obs_count
    }

    /// Per-band running state.
    pub fn bands(&self) -> &[BandState] {
        &self.bands
    }

    /// Grow the band vector to hold at least `n` bands.
    fn ensure_bands(&mut self, n: usize) {
        if self.bands.len() < n {
            self.bands.resize(n, BandState::default());
        }
    }

    /// Book-keeping shared by every policy: count the contribution and
    /// its weight, and make room for its bands.
    fn note_contribution(&mut self, bin: &SpatialBin) {
        self.obs_count += 1;
        self.weight_sum += bin.weight as f64;
        self.ensure_bands(bin.values.len());
    }

    /// Book-keeping shared by every policy when merging two partials.
    fn note_merge(&mut self, other: &BinAccumulator) {
        self.obs_count += other.obs_count;
        self.weight_sum += other.weight_sum;
        self.ensure_bands(other.bands.len());
    }
}

/// Strategy that defines the per-bin statistic.
///
/// `accumulate` folds one contribution, `merge` combines two partial
/// accumulators (used when the spatial pass is sharded), and `finalize`
/// produces the immutable result. `finalize` fails with
/// [`BinningError::EmptyBin`] for an accumulator that never saw a
/// contribution; the merger filters such bins out before finalizing.
pub trait BinAggregator: Send + Sync {
    /// The policy this aggregator implements.
    fn policy(&self) -> AggregationPolicy;

    /// Fold one contribution into the accumulator.
    fn accumulate(&self, acc: &mut BinAccumulator, bin: &SpatialBin);

    /// Fold a partial accumulator into `acc`, equivalent to replaying
    /// every contribution `other` has seen.
    fn merge(&self, acc: &mut BinAccumulator, other: &BinAccumulator);

    /// Produce the finalized bin.
    fn finalize(&self, acc: &BinAccumulator) -> Result<FinalizedBin>;
}

/// Build the aggregator for a configured policy.
pub fn aggregator_for(policy: AggregationPolicy) -> Box<dyn BinAggregator> {
    match policy {
        AggregationPolicy::Mean => Box::new(MeanAggregator),
        AggregationPolicy::Min => Box::new(MinAggregator),
        AggregationPolicy::Max => Box::new(MaxAggregator),
    }
}

/// Assemble a [`FinalizedBin`] from an accumulator, with one closure
/// mapping each band's state to its finalized value.
fn finalize_with<F>(acc: &BinAccumulator, band_value: F) -> Result<FinalizedBin>
where
    F: Fn(&BandState) -> f32,
{
    if acc.obs_count == 0 {
        return Err(BinningError::EmptyBin { index: acc.index });
    }

    let values = acc.bands.iter().map(&band_value).collect();
    let valid_counts = acc.bands.iter().map(|b| b.valid_count).collect();

    Ok(FinalizedBin {
        index: acc.index,
        values,
        valid_counts,
        obs_count: acc.obs_count,
        weight: acc.weight_sum as f32,
    })
}

/// Weighted arithmetic mean per band.
#[derive(Debug, Clone, Copy)]
pub struct MeanAggregator;

impl BinAggregator for MeanAggregator {
    fn policy(&self) -> AggregationPolicy {
        AggregationPolicy::Mean
    }

    fn accumulate(&self, acc: &mut BinAccumulator, bin: &SpatialBin) {
        acc.note_contribution(bin);
        for (band, &value) in acc.bands.iter_mut().zip(&bin.values) {
            if value.is_finite() {
                band.stat += bin.weight as f64 * value as f64;
                band.weight += bin.weight as f64;
                band.valid_count += 1;
            }
        }
    }

    fn merge(&self, acc: &mut BinAccumulator, other: &BinAccumulator) {
        acc.note_merge(other);
        for (band, partial) in acc.bands.iter_mut().zip(&other.bands) {
            band.stat += partial.stat;
            band.weight += partial.weight;
            band.valid_count += partial.valid_count;
        }
    }

    fn finalize(&self, acc: &BinAccumulator) -> Result<FinalizedBin> {
        finalize_with(acc, |band| {
            if band.valid_count > 0 && band.weight > 0.0 {
                (band.stat / band.weight) as f32
            } else {
                f32::NAN
            }
        })
    }
}

/// Minimum valid sample per band.
#[derive(Debug, Clone, Copy)]
pub struct MinAggregator;

impl BinAggregator for MinAggregator {
    fn policy(&self) -> AggregationPolicy {
        AggregationPolicy::Min
    }

    fn accumulate(&self, acc: &mut BinAccumulator, bin: &SpatialBin) {
        acc.note_contribution(bin);
        for (band, &value) in acc.bands.iter_mut().zip(&bin.values) {
            if value.is_finite() {
                let value = value as f64;
                band.stat = if band.valid_count == 0 {
                    value
                } else {
                    band.stat.min(value)
                };
                band.valid_count += 1;
            }
        }
    }

    fn merge(&self, acc: &mut BinAccumulator, other: &BinAccumulator) {
        acc.note_merge(other);
        for (band, partial) in acc.bands.iter_mut().zip(&other.bands) {
            if partial.valid_count > 0 {
                band.stat = if band.valid_count == 0 {
                    partial.stat
                } else {
                    band.stat.min(partial.stat)
                };
                band.valid_count += partial.valid_count;
            }
        }
    }

    fn finalize(&self, acc: &BinAccumulator) -> Result<FinalizedBin> {
        finalize_with(acc, |band| {
            if band.valid_count > 0 {
                band.stat as f32
            } else {
                f32::NAN
            }
        })
    }
}

/// Maximum valid sample per band.
#[derive(Debug, Clone, Copy)]
pub struct MaxAggregator;

impl BinAggregator for MaxAggregator {
    fn policy(&self) -> AggregationPolicy {
        AggregationPolicy::Max
    }

    fn accumulate(&self, acc: &mut BinAccumulator, bin: &SpatialBin) {
        acc.note_contribution(bin);
        for (band, &value) in acc.bands.iter_mut().zip(&bin.values) {
            if value.is_finite() {
                let value = value as f64;
                band.stat = if band.valid_count == 0 {
                    value
                } else {
                    band.stat.max(value)
                };
                band.valid_count += 1;
            }
        }
    }

    fn merge(&self, acc: &mut BinAccumulator, other: &BinAccumulator) {
        acc.note_merge(other);
        for (band, partial) in acc.bands.iter_mut().zip(&other.bands) {
            if partial.valid_count > 0 {
                band.stat = if band.valid_count == 0 {
                    partial.stat
                } else {
                    band.stat.max(partial.stat)
                };
                band.valid_count += partial.valid_count;
            }
        }
    }

    fn finalize(&self, acc: &BinAccumulator) -> Result<FinalizedBin> {
        finalize_with(acc, |band| {
            if band.valid_count > 0 {
                band.stat as f32
            } else {
                f32::NAN
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(index: u64, values: Vec<f32>) -> SpatialBin {
        SpatialBin::new(index, values)
    }

    #[test]
    fn test_mean_accumulation() {
        let agg = MeanAggregator;
        let mut acc = BinAccumulator::new(7, 2);

        agg.accumulate(&mut acc, &bin(7, vec![1.0, 10.0]));
        agg.accumulate(&mut acc, &bin(7, vec![3.0, 20.0]));

        let result = agg.finalize(&acc).unwrap();
        assert_eq!(result.index, 7);
        assert_eq!(result.obs_count, 2);
        assert!((result.values[0] - 2.0).abs() < 1e-6);
        assert!((result.values[1] - 15.0).abs() < 1e-6);
        assert_eq!(result.valid_counts, vec![2, 2]);
    }

    #[test]
    fn test_weighted_mean() {
        let agg = MeanAggregator;
        let mut acc = BinAccumulator::new(0, 1);

        agg.accumulate(&mut acc, &SpatialBin::tagged(0, vec![10.0], 1.0, 0));
        agg.accumulate(&mut acc, &SpatialBin::tagged(0, vec![20.0], 3.0, 1));

        let result = agg.finalize(&acc).unwrap();
        // (10 * 1 + 20 * 3) / 4 = 17.5
        assert!((result.values[0] - 17.5).abs() < 1e-6);
        assert!((result.weight - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_nodata_excluded_but_counted() {
        let agg = MeanAggregator;
        let mut acc = BinAccumulator::new(0, 2);

        agg.accumulate(&mut acc, &bin(0, vec![4.0, f32::NAN]));
        agg.accumulate(&mut acc, &bin(0, vec![f32::NAN, f32::NAN]));

        let result = agg.finalize(&acc).unwrap();
        assert_eq!(result.obs_count, 2);
        assert_eq!(result.valid_counts, vec![1, 0]);
        assert!((result.values[0] - 4.0).abs() < 1e-6);
        assert!(result.values[1].is_nan());
    }

    #[test]
    fn test_min_max_policies() {
        let samples = [vec![3.0f32], vec![-1.0], vec![7.0], vec![f32::NAN]];

        let agg = MinAggregator;
        let mut acc = BinAccumulator::new(0, 1);
        for s in &samples {
            agg.accumulate(&mut acc, &bin(0, s.clone()));
        }
        assert!((agg.finalize(&acc).unwrap().values[0] - (-1.0)).abs() < 1e-6);

        let agg = MaxAggregator;
        let mut acc = BinAccumulator::new(0, 1);
        for s in &samples {
            agg.accumulate(&mut acc, &bin(0, s.clone()));
        }
        assert!((agg.finalize(&acc).unwrap().values[0] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_accumulation_order_independent() {
        let contributions = vec![
            bin(3, vec![1.5, 2.5]),
            bin(3, vec![-4.0, f32::NAN]),
            bin(3, vec![10.0, 0.5]),
            bin(3, vec![0.25, 8.0]),
        ];

        for policy in [
            AggregationPolicy::Mean,
            AggregationPolicy::Min,
            AggregationPolicy::Max,
        ] {
            let agg = aggregator_for(policy);

            let mut forward = BinAccumulator::new(3, 2);
            for c in &contributions {
                agg.accumulate(&mut forward, c);
            }

            let mut reversed = BinAccumulator::new(3, 2);
            for c in contributions.iter().rev() {
                agg.accumulate(&mut reversed, c);
            }

            let a = agg.finalize(&forward).unwrap();
            let b = agg.finalize(&reversed).unwrap();
            for (x, y) in a.values.iter().zip(&b.values) {
                assert!((x - y).abs() < 1e-5, "{} diverged: {} vs {}", policy, x, y);
            }
            assert_eq!(a.valid_counts, b.valid_counts);
        }
    }

    #[test]
    fn test_merge_equals_replay() {
        for policy in [
            AggregationPolicy::Mean,
            AggregationPolicy::Min,
            AggregationPolicy::Max,
        ] {
            let agg = aggregator_for(policy);

            let first = vec![bin(1, vec![2.0]), bin(1, vec![6.0])];
            let second = vec![bin(1, vec![-3.0]), bin(1, vec![11.0])];

            let mut left = BinAccumulator::new(1, 1);
            for c in &first {
                agg.accumulate(&mut left, c);
            }
            let mut right = BinAccumulator::new(1, 1);
            for c in &second {
                agg.accumulate(&mut right, c);
            }
            agg.merge(&mut left, &right);

            let mut replayed = BinAccumulator::new(1, 1);
            for c in first.iter().chain(&second) {
                agg.accumulate(&mut replayed, c);
            }

            let merged = agg.finalize(&left).unwrap();
            let direct = agg.finalize(&replayed).unwrap();
            assert!((merged.values[0] - direct.values[0]).abs() < 1e-5);
            assert_eq!(merged.obs_count, direct.obs_count);
        }
    }

    #[test]
    fn test_finalize_empty_fails() {
        let agg = MeanAggregator;
        let acc = BinAccumulator::new(42, 3);
        assert!(matches!(
            agg.finalize(&acc),
            Err(BinningError::EmptyBin { index: 42 })
        ));
    }
}
