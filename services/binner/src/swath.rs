//! Swath observation file reader.
//!
//! The service-side stand-in for the product reader and raster-sampling
//! collaborators: one CSV-style file per product, one observation per
//! line as `lat,lon,band1[,band2,...]`. Empty fields or `nan` mark a
//! band without data; a line whose every band is missing becomes a
//! count-only observation. Lines starting with `#` are comments.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use binning_engine::pipeline::ObservationSource;
use binning_engine::{BinningError, Observation, Result};

/// One swath file exposed as an observation source.
#[derive(Debug)]
pub struct SwathFileSource {
    path: PathBuf,
    id: String,
    bands: usize,
}

impl SwathFileSource {
    /// Open a swath file, deriving the band count from its first
    /// observation line.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("swath")
            .to_string();

        let file = File::open(path)
            .with_context(|| format!("failed to open swath file {}", path.display()))?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let observation = parse_observation(trimmed)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            return Ok(Self {
                path: path.to_path_buf(),
                id,
                bands: observation.values.len(),
            });
        }

        bail!("{}: no observation lines found", path.display());
    }
}

impl ObservationSource for SwathFileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn num_bands(&self) -> usize {
        self.bands
    }

    fn observations(&self) -> Result<Box<dyn Iterator<Item = Result<Observation>> + '_>> {
        let file = File::open(&self.path)
            .map_err(|e| BinningError::source(&self.id, e.to_string()))?;
        let reader = BufReader::new(file);
        let id = self.id.clone();

        let iter = reader
            .lines()
            .enumerate()
            .filter_map(move |(number, line)| match line {
                Err(err) => Some(Err(BinningError::source(
                    id.clone(),
                    format!("line {}: {}", number + 1, err),
                ))),
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        return None;
                    }
                    Some(parse_observation(trimmed).map_err(|e| {
                        BinningError::source(id.clone(), format!("line {}: {}", number + 1, e))
                    }))
                }
            });

        Ok(Box::new(iter))
    }
}

/// Parse one `lat,lon,band...` line.
fn parse_observation(line: &str) -> std::result::Result<Observation, String> {
    let mut fields = line.split(',');

    let lat = parse_coord(fields.next(), "latitude")?;
    let lon = parse_coord(fields.next(), "longitude")?;

    let mut values = Vec::new();
    for field in fields {
        let field = field.trim();
        if field.is_empty() || field.eq_ignore_ascii_case("nan") {
            values.push(f32::NAN);
        } else {
            let value: f32 = field
                .parse()
                .map_err(|_| format!("invalid band value '{}'", field))?;
            values.push(value);
        }
    }
    if values.is_empty() {
        return Err("no band values".to_string());
    }

    let valid = values.iter().any(|v| v.is_finite());
    Ok(Observation {
        lat,
        lon,
        values,
        weight: 1.0,
        valid,
    })
}

fn parse_coord(field: Option<&str>, what: &str) -> std::result::Result<f64, String> {
    field
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| format!("missing {}", what))?
        .parse()
        .map_err(|_| format!("invalid {}", what))
}
