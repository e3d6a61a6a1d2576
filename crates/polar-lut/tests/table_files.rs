//! Lookup and clutter tables written to disk and managed through the
//! file-backed store.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use polar_lut::{
    ClutterTable, FileTableStore, GeometryConfig, GeometryTable, GeometryTolerance, LookupTable,
    TableEntry,
};
use test_utils::{dbz_field, polar_lookup, polar_scan, stream_metadata};

fn write_tables(dir: &Path, scan_type: i32, num_gates: usize) -> TableEntry {
    let lookup = polar_lookup(scan_type, polar_scan(&[0.5, 1.5], 8, num_gates));
    let reference = vec![80u8; lookup.grid().points_per_volume()];
    let clutter = ClutterTable::from_volume(&lookup, &reference, &dbz_field(), 2.0).unwrap();

    let lookup_path = format!("scan{}.lut", scan_type);
    let clutter_path = format!("scan{}.clt", scan_type);
    lookup
        .save(BufWriter::new(File::create(dir.join(&lookup_path)).unwrap()))
        .unwrap();
    clutter
        .save(BufWriter::new(File::create(dir.join(&clutter_path)).unwrap()))
        .unwrap();

    TableEntry {
        scan_type,
        lookup_path: lookup_path.into(),
        clutter_path: Some(clutter_path.into()),
    }
}

fn config(tables: Vec<TableEntry>) -> GeometryConfig {
    GeometryConfig {
        tables,
        universal: false,
        remove_clutter: true,
        tolerance: GeometryTolerance::default(),
    }
}

#[test]
fn test_swap_tables_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let tables = vec![write_tables(dir.path(), 11, 4), write_tables(dir.path(), 21, 6)];

    let mut geometry =
        GeometryTable::open(config(tables), Box::new(FileTableStore::with_base_dir(dir.path())))
            .unwrap();
    assert_eq!(geometry.scan_type(), 11);
    assert_eq!(geometry.scan().num_gates, 4);
    assert!(geometry.clutter().is_some());

    assert!(geometry.update(21).unwrap());
    assert_eq!(geometry.scan().num_gates, 6);
    assert_eq!(geometry.clutter().map(|c| c.scan_type()), Some(21));

    let meta = stream_metadata(vec![dbz_field()], 6, 21);
    assert!(geometry.check_geometry(&meta, Some(0)).is_ok());
    assert_eq!(geometry.elevation_index(1.5), Some(1));
}

#[test]
fn test_clutter_from_other_geometry_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut entry = write_tables(dir.path(), 11, 4);
    let other = write_tables(dir.path(), 21, 6);
    entry.clutter_path = other.clutter_path;

    let mut geometry =
        GeometryTable::open(config(vec![entry]), Box::new(FileTableStore::with_base_dir(dir.path())))
            .unwrap();
    let meta = stream_metadata(vec![dbz_field()], 4, 11);
    assert!(geometry.check_geometry(&meta, Some(0)).is_err());
}

#[test]
fn test_unreadable_tables_fail_to_open() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.lut"), b"not a table").unwrap();

    for path in ["bad.lut", "missing.lut"] {
        let cfg = GeometryConfig {
            tables: vec![TableEntry {
                scan_type: 1,
                lookup_path: path.into(),
                clutter_path: None,
            }],
            universal: true,
            remove_clutter: false,
            tolerance: GeometryTolerance::default(),
        };
        assert!(
            GeometryTable::open(cfg, Box::new(FileTableStore::with_base_dir(dir.path()))).is_err(),
            "{} should not load",
            path
        );
    }
}

#[test]
fn test_lookup_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path(), 11, 5);
    let loaded = LookupTable::load(File::open(dir.path().join("scan11.lut")).unwrap()).unwrap();
    let expected = polar_lookup(11, polar_scan(&[0.5, 1.5], 8, 5));
    assert_eq!(loaded.header().scan_type, 11);
    assert_eq!(loaded.cells().len(), expected.cells().len());
    assert_eq!(loaded.max_points(), expected.max_points());
}
