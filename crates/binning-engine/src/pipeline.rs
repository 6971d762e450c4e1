//! Binning pipeline orchestration.
//!
//! Drives one run end to end: the spatial pass indexes each product's
//! observations onto the grid and consumes them into a per-product
//! [`SpatialBinStore`]; the temporal pass k-way merges the sealed stores
//! and streams every [`FinalizedBin`] to the output sink in ascending
//! index order.
//!
//! Products never share a store, so the spatial pass can fan out across
//! parallel workers. A failing product is reported and skipped unless the
//! run is configured fail-fast.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use binning_grid::{GridError, IsinGrid};

use crate::aggregator::{aggregator_for, BinAggregator};
use crate::config::BinningConfig;
use crate::error::{BinningError, Result};
use crate::merge::TemporalBinMerger;
use crate::store::SpatialBinStore;
use crate::types::{FinalizedBin, Observation, SpatialBin};

/// Contributions accumulated before each store consume call.
const SPATIAL_BATCH: usize = 4096;

/// One input product: pixel positions plus sampled measurement vectors.
///
/// Stands in for the product reader and raster-sampling collaborators,
/// which live outside the engine. The iterator yields observations in
/// whatever order the product stores them; the engine imposes no
/// ordering requirement.
pub trait ObservationSource: Send + Sync {
    /// Identity of the product, used in reports and logs.
    fn id(&self) -> &str;

    /// Number of measurement bands per observation.
    fn num_bands(&self) -> usize;

    /// Open the observation stream. Per-observation errors abort the
    /// product, not the run.
    fn observations(&self) -> Result<Box<dyn Iterator<Item = Result<Observation>> + '_>>;
}

/// Consumer of finalized bins.
///
/// Receives each bin exactly once, in strictly ascending index order;
/// persistence and durability semantics belong to the implementation.
pub trait BinSink {
    fn write(&mut self, bin: FinalizedBin) -> Result<()>;
}

/// Per-product outcome of the spatial pass.
#[derive(Debug, Clone, Serialize)]
pub struct ProductReport {
    /// Product identity.
    pub product: String,
    /// Observations read from the source.
    pub observations: u64,
    /// Contributions handed to the bin store.
    pub binned: u64,
    /// Observations carrying no valid data (counted, not aggregated).
    pub no_data: u64,
    /// Observations outside the configured region of interest.
    pub out_of_region: u64,
    /// Observations with coordinates outside the valid geographic range.
    pub out_of_range: u64,
    /// Failure message if the product was abandoned.
    pub error: Option<String>,
}

impl ProductReport {
    fn new(product: &str) -> Self {
        Self {
            product: product.to_string(),
            observations: 0,
            binned: 0,
            no_data: 0,
            out_of_region: 0,
            out_of_range: 0,
            error: None,
        }
    }

    /// Whether the product was processed to completion.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one binning run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One report per input product, in input order.
    pub products: Vec<ProductReport>,
    /// Distinct bins emitted to the sink.
    pub bins_emitted: u64,
    /// Contributions aggregated across all products.
    pub contributions: u64,
}

impl RunReport {
    /// Number of products that were processed to completion.
    pub fn products_succeeded(&self) -> usize {
        self.products.iter().filter(|p| p.succeeded()).count()
    }
}

/// Orchestrates spatial binning, temporal merging, and output streaming
/// for one run.
pub struct BinningPipeline {
    config: BinningConfig,
    grid: IsinGrid,
    aggregator: Box<dyn BinAggregator>,
}

impl BinningPipeline {
    /// Create a pipeline for the given configuration.
    pub fn new(config: BinningConfig) -> Result<Self> {
        config.validate()?;
        let grid = IsinGrid::with_edge_rule(config.num_rows, config.edge_rule)?;
        let aggregator = aggregator_for(config.aggregation);

        Ok(Self {
            config,
            grid,
            aggregator,
        })
    }

    /// The grid this pipeline bins onto.
    pub fn grid(&self) -> &IsinGrid {
        &self.grid
    }

    /// The active configuration.
    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    /// Execute one run: bin every product, merge, stream to the sink.
    ///
    /// Returns the run report; product failures are recorded there and
    /// only abort the run when `fail_fast` is configured.
    pub fn run(
        &self,
        sources: &[&dyn ObservationSource],
        sink: &mut dyn BinSink,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            products = sources.len(),
            grid_rows = self.config.num_rows,
            aggregation = %self.config.aggregation,
            backend = %self.config.store_backend,
            "starting binning run"
        );

        let results: Vec<(ProductReport, Option<SpatialBinStore>)> = if self.config.parallel {
            sources
                .par_iter()
                .enumerate()
                .map(|(ordinal, source)| self.bin_product(ordinal, *source))
                .collect::<Result<Vec<_>>>()?
        } else {
            sources
                .iter()
                .enumerate()
                .map(|(ordinal, source)| self.bin_product(ordinal, *source))
                .collect::<Result<Vec<_>>>()?
        };

        let mut products = Vec::with_capacity(results.len());
        let mut stores = Vec::new();
        for (report, store) in results {
            if let Some(message) = &report.error {
                if self.config.fail_fast {
                    return Err(BinningError::source(report.product.clone(), message));
                }
            }
            if let Some(store) = store {
                stores.push(store);
            }
            products.push(report);
        }

        let merger = TemporalBinMerger::from_stores(&mut stores, self.aggregator.as_ref())?;
        let mut bins_emitted = 0u64;
        for bin in merger {
            sink.write(bin?)?;
            bins_emitted += 1;
        }

        let contributions = products.iter().map(|p| p.binned).sum();
        let finished_at = Utc::now();
        info!(
            %run_id,
            bins = bins_emitted,
            contributions,
            succeeded = products.iter().filter(|p| p.succeeded()).count(),
            failed = products.iter().filter(|p| !p.succeeded()).count(),
            "binning run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            products,
            bins_emitted,
            contributions,
        })
    }

    /// Spatial pass for one product: index observations and consume them
    /// into a fresh, finally sealed store.
    ///
    /// Contribution-level problems are counted and skipped; a source
    /// failure abandons the product and records the error in its report.
    /// Only store/configuration failures propagate.
    fn bin_product(
        &self,
        ordinal: usize,
        source: &dyn ObservationSource,
    ) -> Result<(ProductReport, Option<SpatialBinStore>)> {
        let mut report = ProductReport::new(source.id());
        let mut store = SpatialBinStore::from_config(&self.config)?;

        let observations = match source.observations() {
            Ok(iter) => iter,
            Err(err) => {
                warn!(product = %report.product, %err, "failed to open product");
                report.error = Some(err.to_string());
                return Ok((report, None));
            }
        };

        let mut batch = Vec::with_capacity(SPATIAL_BATCH);
        for observation in observations {
            let obs = match observation {
                Ok(obs) => obs,
                Err(err) => {
                    warn!(product = %report.product, %err, "product read failed, skipping rest");
                    report.error = Some(err.to_string());
                    return Ok((report, None));
                }
            };
            report.observations += 1;

            if let Some(region) = &self.config.region {
                if !region.contains(obs.lat, obs.lon) {
                    report.out_of_region += 1;
                    continue;
                }
            }

            match self.contribution(ordinal, &obs) {
                Ok(bin) => {
                    if !obs.valid {
                        report.no_data += 1;
                    }
                    report.binned += 1;
                    batch.push(bin);
                }
                Err(GridError::OutOfRange { .. }) => {
                    report.out_of_range += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            if batch.len() >= SPATIAL_BATCH {
                store.consume(std::mem::take(&mut batch))?;
            }
        }

        if !batch.is_empty() {
            store.consume(batch)?;
        }
        store.consumption_completed()?;

        debug!(
            product = %report.product,
            bands = source.num_bands(),
            observations = report.observations,
            binned = report.binned,
            distinct_bins = store.len(),
            "product binned"
        );
        Ok((report, Some(store)))
    }

    /// Build the contribution for one observation.
    ///
    /// An invalid observation contributes an all-no-data vector so it is
    /// counted without entering the statistics.
    fn contribution(
        &self,
        ordinal: usize,
        obs: &Observation,
    ) -> std::result::Result<SpatialBin, GridError> {
        let index = self.grid.index(obs.lat, obs.lon)?;
        let values = if obs.valid {
            obs.values.clone()
        } else {
            vec![f32::NAN; obs.values.len()]
        };

        Ok(SpatialBin::tagged(index, values, obs.weight, ordinal as u32))
    }
}

impl std::fmt::Debug for BinningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinningPipeline")
            .field("num_rows", &self.config.num_rows)
            .field("aggregation", &self.config.aggregation)
            .field("store_backend", &self.config.store_backend)
            .finish()
    }
}
