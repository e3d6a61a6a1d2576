//! Active lookup/clutter table management.
//!
//! Holds the tables for the current scan type, swaps them when the scan
//! strategy changes, and validates them against the live stream at the
//! start of every volume.

use std::path::PathBuf;

use radar_common::{great_circle_km, StreamMetadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clutter::ClutterTable;
use crate::error::{GeometryError, TableError, TableResult};
use crate::geometry::ScanGeometry;
use crate::lookup::{LookupCell, LookupTable};
use crate::store::TableStore;

/// Elevation angles within this many degrees reuse the cached index.
const ELEVATION_CACHE_TOLERANCE_DEG: f64 = 0.01;

/// One configured table pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub scan_type: i32,
    pub lookup_path: PathBuf,
    #[serde(default)]
    pub clutter_path: Option<PathBuf>,
}

/// Limits for the per-volume geometry check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryTolerance {
    /// Max great-circle distance between live and table radar position
    pub max_position_km: f64,
    /// Allowed live/table altitude ratio range
    pub min_altitude_ratio: f64,
    pub max_altitude_ratio: f64,
    pub max_start_range_diff_km: f64,
    pub max_gate_spacing_diff_km: f64,
}

impl Default for GeometryTolerance {
    fn default() -> Self {
        Self {
            max_position_km: 0.5,
            min_altitude_ratio: 0.999,
            max_altitude_ratio: 1.001,
            max_start_range_diff_km: 0.001,
            max_gate_spacing_diff_km: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Table pairs, searched in order by scan type
    pub tables: Vec<TableEntry>,
    /// One table covers every scan type; never swap
    #[serde(default)]
    pub universal: bool,
    #[serde(default)]
    pub remove_clutter: bool,
    #[serde(default)]
    pub tolerance: GeometryTolerance,
}

/// Tables currently in use.
struct ActiveTables {
    entry: TableEntry,
    lookup: LookupTable,
    clutter: Option<ClutterTable>,
}

/// Owns the lookup (and optional clutter) table for the current scan type.
pub struct GeometryTable {
    config: GeometryConfig,
    store: Box<dyn TableStore>,
    active: ActiveTables,
    elevation_limits: Vec<f64>,
    /// Last (elevation angle, index) resolved
    elevation_cache: Option<(f64, usize)>,
}

impl GeometryTable {
    /// Load the first configured table pair.
    pub fn open(config: GeometryConfig, store: Box<dyn TableStore>) -> TableResult<Self> {
        let entry = config.tables.first().cloned().ok_or(TableError::NoEntries)?;
        let active = load_entry(store.as_ref(), &entry, config.remove_clutter)?;
        let elevation_limits = active.lookup.scan().elevation_limits();
        Ok(Self {
            config,
            store,
            active,
            elevation_limits,
            elevation_cache: None,
        })
    }

    /// Switch to the tables for `scan_type`.
    ///
    /// No-op for universal tables or when `scan_type` is already loaded.
    /// An unknown scan type falls back to the first configured entry with a
    /// warning. Returns true if tables were swapped. The new tables are
    /// fully loaded before the old ones are released.
    pub fn update(&mut self, scan_type: i32) -> TableResult<bool> {
        if self.config.universal || scan_type == self.active.entry.scan_type {
            return Ok(false);
        }

        let entry = match self.config.tables.iter().find(|e| e.scan_type == scan_type) {
            Some(entry) => entry.clone(),
            None => {
                let fallback = self.config.tables.first().cloned().ok_or(TableError::NoEntries)?;
                warn!(
                    scan_type,
                    fallback_scan_type = fallback.scan_type,
                    path = %fallback.lookup_path.display(),
                    "No lookup table for scan type, using first configured table"
                );
                fallback
            }
        };
        if entry == self.active.entry {
            return Ok(false);
        }

        let active = load_entry(self.store.as_ref(), &entry, self.config.remove_clutter)?;
        self.elevation_limits = active.lookup.scan().elevation_limits();
        self.elevation_cache = None;
        self.active = active;
        Ok(true)
    }

    /// Validate the loaded tables against the live stream.
    ///
    /// With clutter removal enabled and a reflectivity field present, the
    /// clutter table's geometry must match the lookup table's exactly, and
    /// its floors are re-encoded to the live reflectivity scale/bias.
    pub fn check_geometry(
        &mut self,
        meta: &StreamMetadata,
        dbz_field: Option<usize>,
    ) -> Result<(), GeometryError> {
        let tol = &self.config.tolerance;
        let header = self.active.lookup.header();
        let scan = self.active.lookup.scan();
        let path = self.active.entry.lookup_path.display().to_string();
        let radar = &meta.radar;

        let distance_km =
            great_circle_km(radar.latitude, radar.longitude, header.radar_lat, header.radar_lon);
        if distance_km > tol.max_position_km {
            return Err(GeometryError::SensorPosition {
                path,
                distance_km,
                max_km: tol.max_position_km,
            });
        }

        let ratio = altitude_ratio(radar.altitude_km, header.radar_alt_km);
        if !(tol.min_altitude_ratio..=tol.max_altitude_ratio).contains(&ratio) {
            return Err(GeometryError::SensorAltitude {
                path,
                live_km: radar.altitude_km,
                table_km: header.radar_alt_km,
                ratio,
            });
        }

        if (radar.start_range_km - scan.start_range_km).abs() > tol.max_start_range_diff_km {
            return Err(GeometryError::StartRange {
                path,
                live_km: radar.start_range_km,
                table_km: scan.start_range_km,
            });
        }

        if (radar.gate_spacing_km - scan.gate_spacing_km).abs() > tol.max_gate_spacing_diff_km {
            return Err(GeometryError::GateSpacing {
                path,
                live_km: radar.gate_spacing_km,
                table_km: scan.gate_spacing_km,
            });
        }

        if let (Some(clutter), Some(dbz_idx)) = (self.active.clutter.as_mut(), dbz_field) {
            if clutter.geometry().to_bytes() != self.active.lookup.geometry().to_bytes() {
                return Err(GeometryError::ClutterMismatch {
                    lookup_path: path,
                    clutter_path: self
                        .active
                        .entry
                        .clutter_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                });
            }
            if let Some(dbz) = meta.fields.get(dbz_idx) {
                if clutter.rescale(dbz) {
                    info!(
                        scale = dbz.scale,
                        bias = dbz.bias,
                        "Clutter floors re-encoded to live reflectivity scale"
                    );
                }
            }
        }

        Ok(())
    }

    /// Elevation index for a beam, reusing the previous answer when the
    /// angle is within 0.01 degrees of the last one resolved.
    pub fn elevation_index(&mut self, elevation: f64) -> Option<usize> {
        if let Some((cached_elev, cached_idx)) = self.elevation_cache {
            if (elevation - cached_elev).abs() <= ELEVATION_CACHE_TOLERANCE_DEG {
                return Some(cached_idx);
            }
        }
        let idx = self
            .active
            .lookup
            .scan()
            .search_elevation(elevation, &self.elevation_limits)?;
        self.elevation_cache = Some((elevation, idx));
        Some(idx)
    }

    pub fn azimuth_index(&self, elev_idx: usize, azimuth: f64) -> Option<usize> {
        self.active.lookup.scan().azimuth_index(elev_idx, azimuth)
    }

    pub fn cell(&self, elev_idx: usize, az_idx: usize) -> Option<&LookupCell> {
        self.active.lookup.cell(elev_idx, az_idx)
    }

    pub fn lookup(&self) -> &LookupTable {
        &self.active.lookup
    }

    pub fn scan(&self) -> &ScanGeometry {
        self.active.lookup.scan()
    }

    /// Clutter table, present only when clutter removal is enabled.
    pub fn clutter(&self) -> Option<&ClutterTable> {
        self.active.clutter.as_ref()
    }

    pub fn scan_type(&self) -> i32 {
        self.active.entry.scan_type
    }

    pub fn lookup_path(&self) -> &std::path::Path {
        &self.active.entry.lookup_path
    }
}

fn load_entry(
    store: &dyn TableStore,
    entry: &TableEntry,
    remove_clutter: bool,
) -> TableResult<ActiveTables> {
    let lookup = store.load_lookup(&entry.lookup_path)?;
    info!(
        scan_type = entry.scan_type,
        path = %entry.lookup_path.display(),
        cells = lookup.cells().len(),
        max_points = lookup.max_points(),
        "Loaded lookup table"
    );

    let clutter = if remove_clutter {
        let path = entry
            .clutter_path
            .as_ref()
            .ok_or(TableError::MissingClutter(entry.scan_type))?;
        let table = store.load_clutter(path)?;
        info!(
            scan_type = entry.scan_type,
            path = %path.display(),
            points = table.num_points(),
            "Loaded clutter table"
        );
        Some(table)
    } else {
        None
    };

    debug!(scan_type = entry.scan_type, "Tables active");
    Ok(ActiveTables {
        entry: entry.clone(),
        lookup,
        clutter,
    })
}

fn altitude_ratio(live: f64, table: f64) -> f64 {
    if table == 0.0 {
        if live == 0.0 {
            1.0
        } else {
            f64::INFINITY
        }
    } else {
        live / table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clutter::ClutterPoint;
    use crate::geometry::{AzimuthScheme, GeometryKind};
    use crate::store::MemoryTableStore;
    use radar_common::{FieldParams, RadarParams};

    const LAT: f64 = 40.0;
    const LON: f64 = -105.0;
    const ALT: f64 = 1.0;

    fn scan(n_gates: usize) -> ScanGeometry {
        ScanGeometry {
            kind: GeometryKind::Polar,
            elevations: vec![0.5, 1.5, 2.5],
            azimuths: AzimuthScheme::Regular {
                num_azimuths: 8,
                delta_az: 45.0,
                az_offset: 22.5,
            },
            start_range_km: 0.0,
            gate_spacing_km: 1.0,
            num_gates: n_gates,
        }
    }

    fn store() -> MemoryTableStore {
        let mut store = MemoryTableStore::new();
        let a = LookupTable::polar(1, (LAT, LON, ALT), scan(4)).unwrap();
        let b = LookupTable::polar(2, (LAT, LON, ALT), scan(6)).unwrap();
        store.insert_lookup("a.lut", &a).unwrap();
        store.insert_lookup("b.lut", &b).unwrap();

        let clutter = ClutterTable::new(
            1,
            1.0,
            -30.0,
            a.geometry().clone(),
            vec![
                vec![ClutterPoint {
                    point_index: 0,
                    floor: 50
                }];
                24
            ],
        )
        .unwrap();
        store.insert_clutter("a.clt", &clutter).unwrap();
        // built against table a, so it cannot pair with table b
        let mismatched = ClutterTable::new(2, 1.0, -30.0, a.geometry().clone(), vec![vec![]; 24]).unwrap();
        store.insert_clutter("b.clt", &mismatched).unwrap();
        store
    }

    fn config(remove_clutter: bool) -> GeometryConfig {
        GeometryConfig {
            tables: vec![
                TableEntry {
                    scan_type: 1,
                    lookup_path: "a.lut".into(),
                    clutter_path: Some("a.clt".into()),
                },
                TableEntry {
                    scan_type: 2,
                    lookup_path: "b.lut".into(),
                    clutter_path: Some("b.clt".into()),
                },
            ],
            universal: false,
            remove_clutter,
            tolerance: GeometryTolerance::default(),
        }
    }

    fn meta() -> StreamMetadata {
        StreamMetadata {
            radar: RadarParams {
                radar_id: 1,
                radar_name: "TEST".to_string(),
                latitude: LAT,
                longitude: LON,
                altitude_km: ALT,
                num_gates: 4,
                gate_spacing_km: 1.0,
                start_range_km: 0.0,
                beam_width_deg: 1.0,
                pulse_width_us: 1.0,
                prf_hz: 1000.0,
                wavelength_cm: 10.0,
                samples_per_beam: 64,
            },
            fields: vec![FieldParams::new("DBZ", "dBZ", 0.5, -32.0)],
            scan_type: 1,
        }
    }

    #[test]
    fn test_update_swaps_and_falls_back() {
        let mut table = GeometryTable::open(config(false), Box::new(store())).unwrap();
        assert_eq!(table.scan_type(), 1);

        assert!(!table.update(1).unwrap());
        assert!(table.update(2).unwrap());
        assert_eq!(table.scan().num_gates, 6);

        // unknown scan type falls back to the first entry
        assert!(table.update(99).unwrap());
        assert_eq!(table.scan_type(), 1);
        assert_eq!(table.scan().num_gates, 4);
    }

    #[test]
    fn test_universal_never_swaps() {
        let mut cfg = config(false);
        cfg.universal = true;
        let mut table = GeometryTable::open(cfg, Box::new(store())).unwrap();
        assert!(!table.update(2).unwrap());
        assert_eq!(table.scan_type(), 1);
    }

    #[test]
    fn test_update_fails_on_unreadable_table() {
        let mut cfg = config(false);
        cfg.tables[1].lookup_path = "missing.lut".into();
        let mut table = GeometryTable::open(cfg, Box::new(store())).unwrap();
        assert!(table.update(2).is_err());
        // previous tables remain usable
        assert_eq!(table.scan_type(), 1);
        assert!(table.cell(0, 0).is_some());
    }

    #[test]
    fn test_elevation_index_cache() {
        let mut table = GeometryTable::open(config(false), Box::new(store())).unwrap();
        assert_eq!(table.elevation_index(0.995), Some(0));
        // 1.004 lies in bin 1 but is within 0.01 of the cached angle
        assert_eq!(table.elevation_index(1.004), Some(0));
        assert_eq!(table.elevation_index(1.6), Some(1));
        assert_eq!(table.elevation_index(1.0), Some(1));
        assert_eq!(table.elevation_index(10.0), None);
    }

    #[test]
    fn test_check_geometry_boundaries() {
        let mut table = GeometryTable::open(config(false), Box::new(store())).unwrap();
        let base = meta();
        assert!(table.check_geometry(&base, Some(0)).is_ok());

        // altitude ratio exactly at the limit passes, just beyond fails
        let mut m = base.clone();
        m.radar.altitude_km = 1.001;
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        m.radar.altitude_km = 1.0011;
        assert!(matches!(
            table.check_geometry(&m, Some(0)),
            Err(GeometryError::SensorAltitude { .. })
        ));

        // start range difference exactly 0.001 passes
        let mut m = base.clone();
        m.radar.start_range_km = 0.001;
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        m.radar.start_range_km = 0.0011;
        assert!(matches!(
            table.check_geometry(&m, Some(0)),
            Err(GeometryError::StartRange { .. })
        ));

        let mut m = base.clone();
        m.radar.gate_spacing_km = 1.01;
        assert!(matches!(
            table.check_geometry(&m, Some(0)),
            Err(GeometryError::GateSpacing { .. })
        ));
    }

    #[test]
    fn test_check_geometry_position_boundary() {
        let mut m = meta();
        m.radar.latitude = LAT + 0.004;
        let distance = great_circle_km(m.radar.latitude, LON, LAT, LON);

        let mut cfg = config(false);
        cfg.tolerance.max_position_km = distance;
        let mut table = GeometryTable::open(cfg.clone(), Box::new(store())).unwrap();
        assert!(table.check_geometry(&m, Some(0)).is_ok());

        cfg.tolerance.max_position_km = distance - 1.0e-6;
        let mut table = GeometryTable::open(cfg, Box::new(store())).unwrap();
        assert!(matches!(
            table.check_geometry(&m, Some(0)),
            Err(GeometryError::SensorPosition { .. })
        ));

        // default tolerance: ~0.44 km passes, ~0.56 km fails
        let mut table = GeometryTable::open(config(false), Box::new(store())).unwrap();
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        m.radar.latitude = LAT + 0.005;
        assert!(table.check_geometry(&m, Some(0)).is_err());
    }

    #[test]
    fn test_clutter_rescaled_once_and_mismatch_detected() {
        let mut table = GeometryTable::open(config(true), Box::new(store())).unwrap();
        assert!(table.check_geometry(&meta(), Some(0)).is_ok());
        // 50 * 1.0 - 30 = 20 dBZ -> (20 + 32) / 0.5 = 104
        assert_eq!(table.clutter().unwrap().cell(0)[0].floor, 104);
        assert_eq!(table.clutter().unwrap().encoding(), (0.5, -32.0));

        table.update(2).unwrap();
        let mut m = meta();
        m.radar.num_gates = 6;
        assert!(matches!(
            table.check_geometry(&m, Some(0)),
            Err(GeometryError::ClutterMismatch { .. })
        ));
        // without a reflectivity field the clutter check does not apply
        assert!(table.check_geometry(&m, None).is_ok());
    }

    #[test]
    fn test_clutter_encoding_changes_do_not_compound() {
        let mut table = GeometryTable::open(config(true), Box::new(store())).unwrap();
        let mut m = meta();
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        assert_eq!(table.clutter().unwrap().cell(0)[0].floor, 104);

        // 20 dBZ at scale 3.0: 52 / 3 rounds to 17
        m.fields[0] = FieldParams::new("DBZ", "dBZ", 3.0, -32.0);
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        assert_eq!(table.clutter().unwrap().cell(0)[0].floor, 17);

        // back to the first encoding: 104 again, not 102 from 17 * 3 - 32
        m.fields[0] = FieldParams::new("DBZ", "dBZ", 0.5, -32.0);
        assert!(table.check_geometry(&m, Some(0)).is_ok());
        assert_eq!(table.clutter().unwrap().cell(0)[0].floor, 104);
    }

    #[test]
    fn test_missing_clutter_entry_is_fatal() {
        let mut cfg = config(true);
        cfg.tables[0].clutter_path = None;
        assert!(matches!(
            GeometryTable::open(cfg, Box::new(store())),
            Err(TableError::MissingClutter(1))
        ));
    }
}
