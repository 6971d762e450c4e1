//! CSV output sink for finalized bins.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use binning_engine::pipeline::BinSink;
use binning_engine::{BinningError, FinalizedBin, Result};
use binning_grid::IsinGrid;

/// Streams finalized bins to a CSV file, one row per bin, in the order
/// the merger emits them.
pub struct CsvBinSink<'a> {
    grid: &'a IsinGrid,
    writer: BufWriter<File>,
    wrote_header: bool,
    rows: u64,
}

impl<'a> CsvBinSink<'a> {
    /// Create the output file. The grid provides each bin's center
    /// coordinate for the output rows.
    pub fn create(path: &Path, grid: &'a IsinGrid) -> std::io::Result<Self> {
        let writer = BufWriter::new(File::create(path)?);
        Ok(Self {
            grid,
            writer,
            wrote_header: false,
            rows: 0,
        })
    }

    /// Flush the output. Call after the run completes.
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| BinningError::sink(e.to_string()))
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl BinSink for CsvBinSink<'_> {
    fn write(&mut self, bin: FinalizedBin) -> Result<()> {
        if !self.wrote_header {
            let bands: Vec<String> = (1..=bin.values.len())
                .map(|b| format!("band_{},count_{}", b, b))
                .collect();
            writeln!(
                self.writer,
                "bin_index,lat,lon,obs_count,weight,{}",
                bands.join(",")
            )
            .map_err(|e| BinningError::sink(e.to_string()))?;
            self.wrote_header = true;
        }

        let (lat, lon) = self.grid.center_of(bin.index)?;
        let bands: Vec<String> = bin
            .values
            .iter()
            .zip(&bin.valid_counts)
            .map(|(value, count)| format!("{},{}", value, count))
            .collect();
        writeln!(
            self.writer,
            "{},{:.6},{:.6},{},{},{}",
            bin.index,
            lat,
            lon,
            bin.obs_count,
            bin.weight,
            bands.join(",")
        )
        .map_err(|e| BinningError::sink(e.to_string()))?;

        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_writes_rows_in_order() {
        let grid = IsinGrid::new(6).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bins.csv");

        let mut sink = CsvBinSink::create(&path, &grid).unwrap();
        for index in [2u64, 5, 9] {
            sink.write(FinalizedBin {
                index,
                values: vec![1.5],
                valid_counts: vec![1],
                obs_count: 1,
                weight: 1.0,
            })
            .unwrap();
        }
        assert_eq!(sink.rows(), 3);
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("bin_index,lat,lon"));
        assert!(lines[1].starts_with("2,"));
        assert!(lines[3].starts_with("9,"));
    }

    #[test]
    fn test_sink_rejects_foreign_index() {
        let grid = IsinGrid::new(6).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvBinSink::create(&dir.path().join("bins.csv"), &grid).unwrap();

        let result = sink.write(FinalizedBin {
            index: 10_000,
            values: vec![],
            valid_counts: vec![],
            obs_count: 1,
            weight: 1.0,
        });
        assert!(result.is_err());
    }
}
