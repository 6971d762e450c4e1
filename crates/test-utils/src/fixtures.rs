//! Swath-file fixtures for service-level tests.

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use crate::generators::SwathPoint;

/// Write observations as a swath CSV file: one `lat,lon,band...` line per
/// observation, `nan` marking a band without data.
pub fn write_swath_file(path: &Path, points: &[SwathPoint]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# lat,lon,bands...")?;
    for (lat, lon, values) in points {
        let bands: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        writeln!(file, "{},{},{}", lat, lon, bands.join(","))?;
    }
    Ok(())
}

/// Create a temporary directory holding one swath CSV file per entry.
///
/// The directory and its files are removed when the returned guard is
/// dropped.
pub fn temp_swath_dir(files: &[(&str, &[SwathPoint])]) -> std::io::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (name, points) in files {
        write_swath_file(&dir.path().join(name), points)?;
    }
    Ok(dir)
}
