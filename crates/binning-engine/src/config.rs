//! Configuration for the binning engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use binning_grid::{EdgeRule, DEFAULT_NUM_ROWS};

use crate::error::{BinningError, Result};
use crate::types::BoundingBox;

/// Configuration for one binning run.
///
/// Passed explicitly at construction time; the engine reads no ambient
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Number of latitude bands of the global grid. The cell count per
    /// degree along the equator equals `num_rows / 180`.
    pub num_rows: usize,

    /// Ownership rule for coordinates exactly on a cell edge.
    pub edge_rule: EdgeRule,

    /// Statistic computed per bin and band.
    pub aggregation: AggregationPolicy,

    /// Which spatial-bin store backend to use.
    pub store_backend: StoreBackend,

    /// Spill directory for the disk backend. Required iff
    /// `store_backend` is [`StoreBackend::Disk`].
    pub spill_dir: Option<PathBuf>,

    /// Bin indices covered by one spill partition file.
    pub spill_partition_span: u64,

    /// Contributions buffered per partition before flushing to disk.
    pub spill_buffer_len: usize,

    /// Optional region of interest; observations outside it are skipped
    /// and counted per product.
    pub region: Option<BoundingBox>,

    /// Run the spatial pass for independent products on parallel workers.
    pub parallel: bool,

    /// Treat any single product failure as fatal to the run.
    pub fail_fast: bool,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            num_rows: DEFAULT_NUM_ROWS,
            edge_rule: EdgeRule::default(),
            aggregation: AggregationPolicy::Mean,
            store_backend: StoreBackend::Memory,
            spill_dir: None,
            spill_partition_span: 1 << 20,
            spill_buffer_len: 16 * 1024,
            region: None,
            parallel: true,
            fail_fast: false,
        }
    }
}

impl BinningConfig {
    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `BINNING_*` environment overrides to this configuration.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("BINNING_NUM_ROWS") {
            if let Ok(rows) = val.parse() {
                self.num_rows = rows;
            }
        }

        if let Ok(val) = std::env::var("BINNING_EDGE_RULE") {
            self.edge_rule = EdgeRule::from_str(&val);
        }

        if let Ok(val) = std::env::var("BINNING_AGGREGATION") {
            self.aggregation = AggregationPolicy::from_str(&val);
        }

        if let Ok(val) = std::env::var("BINNING_STORE_BACKEND") {
            self.store_backend = StoreBackend::from_str(&val);
        }

        if let Ok(val) = std::env::var("BINNING_SPILL_DIR") {
            self.spill_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("BINNING_PARALLEL") {
            self.parallel = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("BINNING_FAIL_FAST") {
            self.fail_fast = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_rows < 2 || self.num_rows % 2 != 0 {
            return Err(BinningError::config(format!(
                "num_rows must be an even number >= 2, got {}",
                self.num_rows
            )));
        }

        if self.store_backend == StoreBackend::Disk && self.spill_dir.is_none() {
            return Err(BinningError::config(
                "spill_dir is required when store_backend is disk",
            ));
        }

        if self.spill_partition_span == 0 {
            return Err(BinningError::config("spill_partition_span must be > 0"));
        }

        if self.spill_buffer_len == 0 {
            return Err(BinningError::config("spill_buffer_len must be > 0"));
        }

        if let Some(region) = &self.region {
            if region.width() <= 0.0 || region.height() <= 0.0 {
                return Err(BinningError::config("region must have positive extent"));
            }
        }

        Ok(())
    }
}

/// Statistic computed for each bin and band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Weighted arithmetic mean of valid samples.
    #[default]
    Mean,
    /// Minimum of valid samples.
    Min,
    /// Maximum of valid samples.
    Max,
}

impl AggregationPolicy {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "min" => Self::Min,
            "max" => Self::Max,
            _ => Self::Mean,
        }
    }

    /// Get the policy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spatial-bin store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// All groups held in an ordered in-memory map; bounded extents.
    #[default]
    Memory,
    /// Contributions spilled to partitioned files; unbounded extents.
    Disk,
}

impl StoreBackend {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disk" | "spill" => Self::Disk,
            _ => Self::Memory,
        }
    }

    /// Get the backend name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BinningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_rows, 2160);
        assert_eq!(config.aggregation, AggregationPolicy::Mean);
        assert_eq!(config.store_backend, StoreBackend::Memory);
    }

    #[test]
    fn test_validation_rejects_bad_rows() {
        let mut config = BinningConfig::default();
        config.num_rows = 0;
        assert!(config.validate().is_err());

        config.num_rows = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disk_backend_requires_spill_dir() {
        let mut config = BinningConfig::default();
        config.store_backend = StoreBackend::Disk;
        assert!(config.validate().is_err());

        config.spill_dir = Some(PathBuf::from("/tmp"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(AggregationPolicy::from_str("mean"), AggregationPolicy::Mean);
        assert_eq!(AggregationPolicy::from_str("MIN"), AggregationPolicy::Min);
        assert_eq!(AggregationPolicy::from_str("max"), AggregationPolicy::Max);
        assert_eq!(
            AggregationPolicy::from_str("unknown"),
            AggregationPolicy::Mean
        );
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(StoreBackend::from_str("memory"), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str("disk"), StoreBackend::Disk);
        assert_eq!(StoreBackend::from_str("spill"), StoreBackend::Disk);
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = BinningConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BinningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.num_rows, config.num_rows);
        assert_eq!(parsed.aggregation, config.aggregation);
    }
}
