//! Clutter floor tables.
//!
//! A clutter table lists, for each lookup cell, the points whose
//! clear-air reflectivity marks them as ground clutter, together with the
//! floor value. Live reflectivity at or below the floor is suppressed.
//!
//! # File format
//!
//! ```text
//! "PCLT" | u32 version | i32 scan_type | f64 dbz_scale | f64 dbz_bias
//! | u32 len + geometry block | u32 n_cells
//! | per cell: u32 count, count x (u32 point_index, u8 floor)
//! | u32 crc32
//! ```

use std::io::{Read, Write};

use radar_common::{FieldParams, MISSING_BYTE};
use tracing::debug;

use crate::codec::{read_preamble, verify_crc, ByteReader, ByteWriter};
use crate::error::{TableError, TableResult};
use crate::geometry::TableGeometry;
use crate::lookup::LookupTable;

const MAGIC: &[u8; 4] = b"PCLT";
const VERSION: u32 = 1;

/// One clutter-affected point within a lookup cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClutterPoint {
    /// Index of the point within its lookup cell
    pub point_index: u32,
    /// Encoded reflectivity floor
    pub floor: u8,
}

#[derive(Debug, Clone)]
pub struct ClutterTable {
    scan_type: i32,
    dbz_scale: f64,
    dbz_bias: f64,
    geometry: TableGeometry,
    /// Floors as stored, at `dbz_scale` / `dbz_bias`
    cells: Vec<Vec<ClutterPoint>>,
    /// Floors re-encoded for the live stream, when its encoding differs
    live: Option<LiveFloors>,
}

#[derive(Debug, Clone)]
struct LiveFloors {
    scale: f64,
    bias: f64,
    cells: Vec<Vec<ClutterPoint>>,
}

impl ClutterTable {
    pub fn new(
        scan_type: i32,
        dbz_scale: f64,
        dbz_bias: f64,
        geometry: TableGeometry,
        cells: Vec<Vec<ClutterPoint>>,
    ) -> TableResult<Self> {
        let expected = geometry.scan.num_cells();
        if cells.len() != expected {
            return Err(TableError::invalid(format!(
                "clutter table has {} cells, geometry needs {}",
                cells.len(),
                expected
            )));
        }
        if dbz_scale == 0.0 {
            return Err(TableError::invalid("clutter table scale is zero"));
        }
        Ok(Self {
            scan_type,
            dbz_scale,
            dbz_bias,
            geometry,
            cells,
            live: None,
        })
    }

    /// Derive a clutter table from a clear-air reference volume.
    ///
    /// `reference` is one field's encoded reflectivity volume laid out by
    /// the lookup table's grid offsets. Every mapped point with data gets a
    /// floor of its reference value plus `margin_db`.
    pub fn from_volume(
        lookup: &LookupTable,
        reference: &[u8],
        dbz: &FieldParams,
        margin_db: f64,
    ) -> TableResult<Self> {
        let expected = lookup.grid().points_per_volume();
        if reference.len() != expected {
            return Err(TableError::invalid(format!(
                "reference volume has {} points, grid needs {}",
                reference.len(),
                expected
            )));
        }

        let cells = lookup
            .cells()
            .iter()
            .map(|cell| {
                (0..cell.num_points())
                    .filter_map(|k| {
                        let point = cell.point(k)?;
                        let value = *reference.get(point.offset as usize)?;
                        (value != MISSING_BYTE).then(|| ClutterPoint {
                            point_index: k as u32,
                            floor: dbz.encode(dbz.decode(value) + margin_db),
                        })
                    })
                    .collect()
            })
            .collect();

        Self::new(
            lookup.header().scan_type,
            dbz.scale,
            dbz.bias,
            lookup.geometry().clone(),
            cells,
        )
    }

    pub fn scan_type(&self) -> i32 {
        self.scan_type
    }

    pub fn geometry(&self) -> &TableGeometry {
        &self.geometry
    }

    /// Encoding of the floors returned by [`cell`](Self::cell).
    pub fn encoding(&self) -> (f64, f64) {
        match &self.live {
            Some(live) => (live.scale, live.bias),
            None => (self.dbz_scale, self.dbz_bias),
        }
    }

    /// Clutter points for a flat cell index.
    pub fn cell(&self, cell_index: usize) -> &[ClutterPoint] {
        let cells = match &self.live {
            Some(live) => &live.cells,
            None => &self.cells,
        };
        cells.get(cell_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_points(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    /// Re-encode the floors to the live reflectivity encoding.
    ///
    /// Always derived from the stored floors, so successive encodings never
    /// compound rounding. Returns false when the floors already use `dbz`'s
    /// encoding and nothing changed.
    pub fn rescale(&mut self, dbz: &FieldParams) -> bool {
        if dbz.scale == 0.0 {
            return false;
        }
        let (scale, bias) = self.encoding();
        if dbz.same_encoding(scale, bias) {
            return false;
        }

        if dbz.same_encoding(self.dbz_scale, self.dbz_bias) {
            self.live = None;
        } else {
            let cells: Vec<Vec<ClutterPoint>> = self
                .cells
                .iter()
                .map(|cell| {
                    cell.iter()
                        .map(|point| ClutterPoint {
                            point_index: point.point_index,
                            floor: dbz.encode(point.floor as f64 * self.dbz_scale + self.dbz_bias),
                        })
                        .collect()
                })
                .collect();
            self.live = Some(LiveFloors {
                scale: dbz.scale,
                bias: dbz.bias,
                cells,
            });
        }
        debug!(
            old_scale = scale,
            old_bias = bias,
            new_scale = dbz.scale,
            new_bias = dbz.bias,
            "Rescaled clutter floors"
        );
        true
    }

    pub fn save<W: Write>(&self, mut writer: W) -> TableResult<()> {
        let mut w = ByteWriter::new();
        w.bytes(MAGIC);
        w.u32(VERSION);
        w.i32(self.scan_type);
        w.f64(self.dbz_scale);
        w.f64(self.dbz_bias);
        w.block(&self.geometry.to_bytes());
        w.u32(self.cells.len() as u32);
        for cell in &self.cells {
            w.u32(cell.len() as u32);
            for p in cell {
                w.u32(p.point_index);
                w.u8(p.floor);
            }
        }
        writer.write_all(&w.finish_with_crc())?;
        Ok(())
    }

    /// Load a clutter table. The geometry block is kept as decoded so it
    /// can be compared byte for byte with the lookup table's.
    pub fn load<R: Read>(mut reader: R) -> TableResult<Self> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image)?;
        let body = verify_crc(&image)?;

        let mut r = ByteReader::new(body);
        read_preamble(&mut r, MAGIC, "PCLT", VERSION)?;

        let scan_type = r.i32()?;
        let dbz_scale = r.f64()?;
        let dbz_bias = r.f64()?;
        let geometry = TableGeometry::from_bytes(r.block()?)?;

        let n_cells = r.u32()? as usize;
        let mut cells = Vec::with_capacity(n_cells);
        for _ in 0..n_cells {
            let count = r.u32()? as usize;
            let mut cell = Vec::with_capacity(count);
            for _ in 0..count {
                cell.push(ClutterPoint {
                    point_index: r.u32()?,
                    floor: r.u8()?,
                });
            }
            cells.push(cell);
        }

        Self::new(scan_type, dbz_scale, dbz_bias, geometry, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{AzimuthScheme, GeometryKind, ScanGeometry};

    fn lookup() -> LookupTable {
        let scan = ScanGeometry {
            kind: GeometryKind::Polar,
            elevations: vec![0.5],
            azimuths: AzimuthScheme::Regular {
                num_azimuths: 4,
                delta_az: 90.0,
                az_offset: 45.0,
            },
            start_range_km: 0.0,
            gate_spacing_km: 1.0,
            num_gates: 3,
        };
        LookupTable::polar(1, (0.0, 0.0, 0.0), scan).unwrap()
    }

    #[test]
    fn test_from_volume_and_roundtrip() {
        let lut = lookup();
        let dbz = FieldParams::new("DBZ", "dBZ", 0.5, -32.0);
        let mut reference = vec![MISSING_BYTE; 12];
        reference[1] = dbz.encode(20.0);
        reference[7] = dbz.encode(10.0);

        let table = ClutterTable::from_volume(&lut, &reference, &dbz, 5.0).unwrap();
        assert_eq!(table.num_points(), 2);
        assert_eq!(
            table.cell(0),
            &[ClutterPoint {
                point_index: 1,
                floor: dbz.encode(25.0)
            }]
        );
        assert_eq!(table.cell(2)[0].point_index, 1);

        let mut buffer = Vec::new();
        table.save(&mut buffer).unwrap();
        let restored = ClutterTable::load(&buffer[..]).unwrap();
        assert_eq!(restored.cell(0), table.cell(0));
        assert_eq!(restored.geometry().to_bytes(), lut.geometry().to_bytes());
    }

    #[test]
    fn test_rescale() {
        let lut = lookup();
        let cells = vec![
            vec![ClutterPoint {
                point_index: 0,
                floor: 104,
            }],
            vec![],
            vec![],
            vec![],
        ];
        // 104 * 0.5 - 32 = 20 dBZ
        let mut table = ClutterTable::new(1, 0.5, -32.0, lut.geometry().clone(), cells).unwrap();

        assert!(!table.rescale(&FieldParams::new("DBZ", "dBZ", 0.5, -32.0)));
        assert!(table.rescale(&FieldParams::new("DBZ", "dBZ", 1.0, -30.0)));
        assert_eq!(table.cell(0)[0].floor, 50);
        assert_eq!(table.encoding(), (1.0, -30.0));
    }

    #[test]
    fn test_rescale_starts_from_stored_floors() {
        let lut = lookup();
        let cells = vec![
            vec![ClutterPoint {
                point_index: 0,
                floor: 105,
            }],
            vec![],
            vec![],
            vec![],
        ];
        // 105 * 0.5 - 32 = 20.5 dBZ
        let mut table = ClutterTable::new(1, 0.5, -32.0, lut.geometry().clone(), cells).unwrap();
        let coarse = FieldParams::new("DBZ", "dBZ", 1.0, -32.0);
        let shifted = FieldParams::new("DBZ", "dBZ", 0.5, -31.0);

        // 20.5 dBZ at scale 1.0 rounds to 53 (21 dBZ)
        assert!(table.rescale(&coarse));
        assert_eq!(table.cell(0)[0].floor, 53);

        // from the stored 20.5 dBZ, not the rounded 21 dBZ: (20.5 + 31) / 0.5
        assert!(table.rescale(&shifted));
        assert_eq!(table.cell(0)[0].floor, 103);

        assert!(table.rescale(&FieldParams::new("DBZ", "dBZ", 0.5, -32.0)));
        assert_eq!(table.cell(0)[0].floor, 105);
        assert_eq!(table.encoding(), (0.5, -32.0));

        // saving keeps the stored encoding
        table.rescale(&coarse);
        let mut buffer = Vec::new();
        table.save(&mut buffer).unwrap();
        let restored = ClutterTable::load(&buffer[..]).unwrap();
        assert_eq!(restored.encoding(), (0.5, -32.0));
        assert_eq!(restored.cell(0)[0].floor, 105);
    }

    #[test]
    fn test_cell_out_of_range_is_empty() {
        let lut = lookup();
        let table = ClutterTable::new(1, 0.5, -32.0, lut.geometry().clone(), vec![vec![]; 4]).unwrap();
        assert!(table.cell(99).is_empty());
    }
}
