//! Radar gridding service.
//!
//! Reads a beam archive, resamples every beam onto the lookup-table grid
//! for its scan strategy and writes complete and intermediate volumes to
//! the configured output directories.

mod config;
mod sources;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use polar_lut::{FileTableStore, GeometryTable};
use resampler::{ResampleEngine, RunSummary, SystemClock, VolumeController, VolumeOutputWriter};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{load_config, GridderConfig, LoggingConfig};
use sources::ArchiveBeamSource;

#[derive(Parser, Debug)]
#[command(name = "gridder")]
#[command(about = "Resample radar beams onto lookup-table grids")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "GRIDDER_CONFIG", default_value = "config/gridder.yaml")]
    config: PathBuf,

    /// Beam archive to process (JSON lines)
    #[arg(short, long, env = "GRIDDER_INPUT")]
    input: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gridder: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= args.json_logs;

    if args.print_config {
        return match serde_yaml::to_string(&config) {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("gridder: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("gridder: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(config, args.input) {
        Ok(summary) => {
            info!(
                volumes_written = summary.volumes_written,
                volumes_rejected = summary.volumes_rejected,
                volumes_skipped = summary.volumes_skipped,
                beams = summary.beams,
                write_failures = summary.write_failures,
                "Gridder finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Gridder stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.to_lowercase()))
        .context("Invalid log filter")?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn run(config: GridderConfig, input: Option<PathBuf>) -> Result<RunSummary> {
    let input = input.context("No beam archive given (--input or GRIDDER_INPUT)")?;

    info!(
        input = %input.display(),
        tables = config.geometry.tables.len(),
        output_dir = %config.output.output_dir.display(),
        "Starting gridder"
    );

    let store = match &config.table_dir {
        Some(dir) => FileTableStore::with_base_dir(dir),
        None => FileTableStore::new(),
    };
    let geometry = GeometryTable::open(config.geometry, Box::new(store))
        .context("Failed to load geometry tables")?;

    let engine = ResampleEngine::new(config.resample, geometry);
    let writer = VolumeOutputWriter::to_files(config.output);
    let source = ArchiveBeamSource::open(&input)
        .with_context(|| format!("Failed to open beam archive {}", input.display()))?;

    let mut controller = VolumeController::new(engine, writer, source, SystemClock);
    let summary = controller.run()?;
    Ok(summary)
}
