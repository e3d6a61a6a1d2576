//! End-to-end: tables on disk, a beam stream, grids written to disk.
//!
//! 1. Write a lookup table with the table codec
//! 2. Feed complete sweeps through the controller
//! 3. Read the written grid files back and check every value

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Duration;
use polar_lut::{
    FileTableStore, GeometryConfig, GeometryTable, GeometryTolerance, LookupTable, TableEntry,
};
use resampler::{
    read_grid, MemoryBeamSource, OutputConfig, ResampleConfig, ResampleEngine, SourceUnit,
    SystemClock, VolumeController, VolumeOutputWriter,
};
use test_utils::{
    base_time, dbz_field, polar_lookup, polar_scan, ppi_plane, stream_metadata, vel_field,
    volume_sweep, pattern_value, RADAR_ALT_KM, RADAR_LAT, RADAR_LON,
};

const ELEVATIONS: [f64; 3] = [0.5, 1.5, 2.5];
const N_AZ: usize = 12;
const N_GATES: usize = 10;

fn save_table(dir: &Path, name: &str, table: &LookupTable) {
    let mut writer = BufWriter::new(File::create(dir.join(name)).unwrap());
    table.save(&mut writer).unwrap();
}

fn engine(dir: &Path, name: &str) -> ResampleEngine {
    let geometry = GeometryTable::open(
        GeometryConfig {
            tables: vec![TableEntry {
                scan_type: 1,
                lookup_path: name.into(),
                clutter_path: None,
            }],
            universal: true,
            remove_clutter: false,
            tolerance: GeometryTolerance::default(),
        },
        Box::new(FileTableStore::with_base_dir(dir)),
    )
    .unwrap();
    ResampleEngine::new(ResampleConfig::default(), geometry)
}

fn output(dir: &Path) -> OutputConfig {
    OutputConfig {
        output_dir: dir.join("volumes"),
        latest_dir: dir.join("latest"),
        max_volume_duration_secs: 600.0,
        check_missing_beams: true,
        max_missing_beams: 0,
        ..Default::default()
    }
}

fn sweep(volume_num: i32, offset_secs: i64) -> Vec<SourceUnit> {
    let meta = stream_metadata(vec![dbz_field(), vel_field()], N_GATES, 1);
    let mut units = vec![SourceUnit::start_of_volume()];
    units.extend(
        volume_sweep(
            &meta,
            &ELEVATIONS,
            N_AZ,
            volume_num,
            base_time() + Duration::seconds(offset_secs),
        )
        .into_iter()
        .map(SourceUnit::beam),
    );
    units.push(SourceUnit::end_of_volume());
    units
}

#[test]
fn test_polar_volume_covers_every_cell() {
    let dir = tempfile::tempdir().unwrap();
    save_table(
        dir.path(),
        "polar.lut",
        &polar_lookup(1, polar_scan(&ELEVATIONS, N_AZ, N_GATES)),
    );

    let mut controller = VolumeController::new(
        engine(dir.path(), "polar.lut"),
        VolumeOutputWriter::to_files(output(dir.path())),
        MemoryBeamSource::new(sweep(1, 0)),
        SystemClock,
    );
    let summary = controller.run().unwrap();
    assert_eq!(summary.volumes_written, 1);
    assert_eq!(summary.beams_written, ELEVATIONS.len() * N_AZ);

    // 36 beams one second apart: centroid at +17.5 s
    let grid = read_grid(&dir.path().join("volumes/20240601/120017.rgrd")).unwrap();
    assert_eq!(grid.data.len(), 2);
    for (field, data) in grid.data.iter().enumerate() {
        for e in 0..ELEVATIONS.len() {
            for a in 0..N_AZ {
                for g in 0..N_GATES {
                    let offset = (e * N_AZ + a) * N_GATES + g;
                    assert_eq!(
                        data[offset],
                        pattern_value(e, a, g, field),
                        "field {} elev {} az {} gate {}",
                        field,
                        e,
                        a,
                        g
                    );
                }
            }
        }
    }
}

#[test]
fn test_volume_and_accum_identical_after_clean_volume() {
    let dir = tempfile::tempdir().unwrap();
    save_table(
        dir.path(),
        "polar.lut",
        &polar_lookup(1, polar_scan(&ELEVATIONS, N_AZ, N_GATES)),
    );

    let mut controller = VolumeController::new(
        engine(dir.path(), "polar.lut"),
        VolumeOutputWriter::to_files(output(dir.path())),
        MemoryBeamSource::new(sweep(1, 0)),
        SystemClock,
    );
    controller.run().unwrap();

    let grids = controller.engine().grids();
    assert_eq!(grids.volume().as_bytes(), grids.accum().as_bytes());
    assert_eq!(grids.volume().coverage(0), ELEVATIONS.len() * N_AZ * N_GATES);
}

#[test]
fn test_single_missed_beam_filled_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    save_table(
        dir.path(),
        "polar.lut",
        &polar_lookup(1, polar_scan(&ELEVATIONS, N_AZ, N_GATES)),
    );

    // drop azimuth 5 on the lowest tilt
    let units: Vec<SourceUnit> = sweep(1, 0)
        .into_iter()
        .filter(|u| {
            u.beam
                .as_ref()
                .map_or(true, |b| !(b.elevation == 0.5 && b.azimuth == 150.0))
        })
        .collect();
    let mut controller = VolumeController::new(
        engine(dir.path(), "polar.lut"),
        VolumeOutputWriter::to_files(output(dir.path())),
        MemoryBeamSource::new(units),
        SystemClock,
    );
    let summary = controller.run().unwrap();
    // the gap beam makes the volume complete again
    assert_eq!(summary.volumes_written, 1);
    assert_eq!(summary.beams_written, ELEVATIONS.len() * N_AZ);

    let vol = controller.engine().grids().volume();
    for g in 0..N_GATES {
        let a = pattern_value(0, 4, g, 0) as u16;
        let b = pattern_value(0, 6, g, 0) as u16;
        assert_eq!(vol.get(0, 5 * N_GATES + g), Some(((a + b + 1) / 2) as u8));
    }
}

#[test]
fn test_ppi_volume_matches_accumulation() {
    let dir = tempfile::tempdir().unwrap();
    let table = LookupTable::ppi(
        1,
        (RADAR_LAT, RADAR_LON, RADAR_ALT_KM),
        polar_scan(&ELEVATIONS, N_AZ, N_GATES),
        ppi_plane(11, 1.5),
    )
    .unwrap();
    save_table(dir.path(), "ppi.lut", &table);

    let mut units = sweep(1, 0);
    units.extend(sweep(2, 120));
    let mut controller = VolumeController::new(
        engine(dir.path(), "ppi.lut"),
        VolumeOutputWriter::to_files(output(dir.path())),
        MemoryBeamSource::new(units),
        SystemClock,
    );
    let summary = controller.run().unwrap();
    assert_eq!(summary.volumes_written, 2);

    // second sweep rewrites every cell the first one touched
    let grids = controller.engine().grids();
    assert_eq!(grids.volume().as_bytes(), grids.accum().as_bytes());
    assert!(grids.volume().coverage(0) > 0);

    let written = read_grid(&dir.path().join("volumes/20240601/120217.rgrd")).unwrap();
    assert_eq!(written.data[0], grids.volume().field(0).unwrap());
    assert_eq!(written.header.master.nz, ELEVATIONS.len());
}
