//! Binning service.
//!
//! Reads swath observation files, bins them onto the global grid, merges
//! across inputs, and writes the finalized bins as CSV.

mod config;
mod sink;
mod swath;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

use binning_engine::pipeline::{BinningPipeline, ObservationSource};

use sink::CsvBinSink;
use swath::SwathFileSource;

#[derive(Parser, Debug)]
#[command(name = "binner")]
#[command(about = "Spatial/temporal binning of swath observation files")]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Swath files or directories to bin
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = "bins.csv")]
    output: PathBuf,

    /// Print the run report as JSON to stdout
    #[arg(long)]
    report: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting binner");

    let config = config::load(args.config.as_deref())?;
    info!(
        num_rows = config.num_rows,
        aggregation = %config.aggregation,
        backend = %config.store_backend,
        "Loaded configuration"
    );

    let files = discover_inputs(&args.inputs)?;
    if files.is_empty() {
        bail!("no swath files found under the given inputs");
    }
    info!(files = files.len(), "Discovered input files");

    let mut sources = Vec::with_capacity(files.len());
    for file in &files {
        match SwathFileSource::open(file) {
            Ok(source) => sources.push(source),
            Err(err) => warn!(file = %file.display(), %err, "Skipping unreadable input"),
        }
    }
    if sources.is_empty() {
        bail!("none of the discovered inputs was readable");
    }

    let pipeline = BinningPipeline::new(config)?;
    let mut sink = CsvBinSink::create(&args.output, pipeline.grid())
        .with_context(|| format!("failed to create output {}", args.output.display()))?;

    let refs: Vec<&dyn ObservationSource> = sources
        .iter()
        .map(|s| s as &dyn ObservationSource)
        .collect();
    let report = pipeline.run(&refs, &mut sink)?;
    sink.finish()?;

    info!(
        run_id = %report.run_id,
        bins = report.bins_emitted,
        products_ok = report.products_succeeded(),
        products_failed = report.products.len() - report.products_succeeded(),
        output = %args.output.display(),
        "Run complete"
    );
    for product in report.products.iter().filter(|p| !p.succeeded()) {
        warn!(
            product = %product.product,
            error = product.error.as_deref().unwrap_or(""),
            "Product failed"
        );
    }

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// Expand files and directories into the list of swath files to bin.
fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", input.display()))?;
            if entry.file_type().is_file() && is_swath_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_swath_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("csv") | Some("swath")
    )
}
