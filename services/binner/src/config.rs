//! Service configuration loading.
//!
//! Configuration is resolved in three layers: engine defaults, then the
//! optional YAML file, then `BINNING_*` environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use binning_engine::BinningConfig;

/// Top-level YAML document accepted by the service.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BinnerConfigFile {
    binning: BinningConfig,
}

/// Load the engine configuration for a run.
pub fn load(path: Option<&Path>) -> Result<BinningConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let parsed: BinnerConfigFile = serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            parsed.binning
        }
        None => BinningConfig::default(),
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}
