//! CLI tool to pre-compute radar lookup tables.
//!
//! Builds a gate-to-grid lookup table for one scan strategy and writes it
//! to a binary file the gridder loads at startup.
//!
//! Usage:
//!   generate-polar-lut --kind polar --scan-type 12 \
//!       --lat 40.0 --lon -105.0 --alt-km 1.6 \
//!       --elevations 0.5,1.5,2.4 --num-gates 460 --gate-spacing-km 0.25 \
//!       --output ./data/tables/scan12.lut

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use polar_lut::{AzimuthScheme, GeometryKind, GridParams, LookupTable, ScanGeometry};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Polar,
    Ppi,
    Cartesian,
}

#[derive(Parser, Debug)]
#[command(name = "generate-polar-lut")]
#[command(about = "Pre-compute a radar gate-to-grid lookup table")]
struct Args {
    /// Output grid layout
    #[arg(long, value_enum, default_value = "polar")]
    kind: Kind,

    /// Scan strategy identifier stored in the table header
    #[arg(long)]
    scan_type: i32,

    /// Radar latitude (degrees)
    #[arg(long)]
    lat: f64,

    /// Radar longitude (degrees)
    #[arg(long)]
    lon: f64,

    /// Radar altitude (km MSL)
    #[arg(long)]
    alt_km: f64,

    /// Comma-separated elevation angles, ascending
    #[arg(long, value_delimiter = ',', required = true)]
    elevations: Vec<f64>,

    #[arg(long, default_value_t = 360)]
    num_azimuths: usize,

    #[arg(long)]
    num_gates: usize,

    #[arg(long)]
    gate_spacing_km: f64,

    #[arg(long, default_value_t = 0.0)]
    start_range_km: f64,

    /// Grid points in x and y (PPI/Cartesian only)
    #[arg(long, default_value_t = 400)]
    nx: usize,
    #[arg(long, default_value_t = 400)]
    ny: usize,

    /// Grid spacing in km (PPI/Cartesian only)
    #[arg(long, default_value_t = 1.0)]
    dxy_km: f64,

    /// Cartesian levels: count, spacing and lowest height (km)
    #[arg(long, default_value_t = 20)]
    nz: usize,
    #[arg(long, default_value_t = 0.5)]
    dz_km: f64,
    #[arg(long, default_value_t = 0.5)]
    minz_km: f64,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.num_azimuths == 0 {
        bail!("--num-azimuths must be positive");
    }
    if args.elevations.windows(2).any(|w| w[1] <= w[0]) {
        bail!("--elevations must be strictly ascending");
    }

    let delta_az = 360.0 / args.num_azimuths as f64;
    let scan = ScanGeometry {
        kind: GeometryKind::Polar,
        elevations: args.elevations.clone(),
        azimuths: AzimuthScheme::Regular {
            num_azimuths: args.num_azimuths,
            delta_az,
            az_offset: delta_az / 2.0,
        },
        start_range_km: args.start_range_km,
        gate_spacing_km: args.gate_spacing_km,
        num_gates: args.num_gates,
    };
    let radar = (args.lat, args.lon, args.alt_km);

    // grid centred on the radar
    let plane = GridParams {
        nx: args.nx,
        ny: args.ny,
        nz: args.nz,
        dx: args.dxy_km,
        dy: args.dxy_km,
        dz: args.dz_km,
        minx: -(args.nx.saturating_sub(1) as f64) * args.dxy_km / 2.0,
        miny: -(args.ny.saturating_sub(1) as f64) * args.dxy_km / 2.0,
        minz: args.minz_km,
    };

    let start = Instant::now();
    let table = match args.kind {
        Kind::Polar => LookupTable::polar(args.scan_type, radar, scan)?,
        Kind::Ppi => LookupTable::ppi(args.scan_type, radar, scan, plane)?,
        Kind::Cartesian => LookupTable::cartesian(args.scan_type, radar, scan, plane)?,
    };
    let mapped: usize = table.cells().iter().map(|c| c.num_points()).sum();
    info!(
        kind = ?args.kind,
        cells = table.cells().len(),
        mapped_points = mapped,
        max_points = table.max_points(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Computed lookup table"
    );

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    table.save(&mut writer)?;
    writer.flush()?;

    let size = fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    info!(
        path = %args.output.display(),
        size_mb = size as f64 / 1024.0 / 1024.0,
        "Saved lookup table"
    );
    Ok(())
}
