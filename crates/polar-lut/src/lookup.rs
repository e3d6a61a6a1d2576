//! Gate-to-grid lookup tables.
//!
//! # File format
//!
//! ```text
//! "PLUT" | u32 version | i32 scan_type | f64 lat | f64 lon | f64 alt_km
//! | u32 len + geometry block | u32 n_cells
//! | per cell: u8 tag
//! |   tag 0 (points): u32 count, count x (u32 gate, u32 offset)
//! |   tag 1 (polar):  u32 base_offset, u32 num_points, u32 last_data_gate
//! | u32 crc32
//! ```

use std::io::{Read, Write};

use radar_common::geo::EARTH_RADIUS_KM;

use crate::codec::{read_preamble, verify_crc, ByteReader, ByteWriter};
use crate::error::{TableError, TableResult};
use crate::geometry::{AzimuthScheme, GeometryKind, GridParams, ScanGeometry, TableGeometry};

const MAGIC: &[u8; 4] = b"PLUT";
const VERSION: u32 = 1;

/// One source gate feeding one destination grid offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPoint {
    pub gate: u32,
    /// Offset within one field's volume (plane-major)
    pub offset: u32,
}

/// Mapping for a single (elevation, azimuth) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupCell {
    /// Cartesian and PPI tables: explicit (gate, offset) pairs.
    Points(Vec<LookupPoint>),
    /// Polar tables: offsets increase contiguously with gate index.
    Polar {
        base_offset: u32,
        num_points: u32,
        /// Last gate carrying real data; later gates are padding
        last_data_gate: u32,
    },
}

impl LookupCell {
    pub fn num_points(&self) -> usize {
        match self {
            Self::Points(points) => points.len(),
            Self::Polar { num_points, .. } => *num_points as usize,
        }
    }

    /// Source gate and destination offset for the `k`-th point of the
    /// cell. Polar padding gates yield `None`.
    #[inline]
    pub fn point(&self, k: usize) -> Option<LookupPoint> {
        match self {
            Self::Points(points) => points.get(k).copied(),
            Self::Polar {
                base_offset,
                num_points,
                last_data_gate,
            } => {
                let k32 = k as u32;
                (k32 < *num_points && k32 <= *last_data_gate).then(|| LookupPoint {
                    gate: k32,
                    offset: base_offset + k32,
                })
            }
        }
    }

    fn max_offset(&self) -> Option<u32> {
        match self {
            Self::Points(points) => points.iter().map(|p| p.offset).max(),
            Self::Polar {
                base_offset,
                num_points,
                ..
            } => num_points.checked_sub(1).map(|n| base_offset + n),
        }
    }
}

/// Table header: scan type, the sensor location the table was built for,
/// and its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupHeader {
    pub scan_type: i32,
    pub radar_lat: f64,
    pub radar_lon: f64,
    pub radar_alt_km: f64,
    pub geometry: TableGeometry,
}

/// Complete lookup table for one scan type.
#[derive(Debug, Clone)]
pub struct LookupTable {
    header: LookupHeader,
    cells: Vec<LookupCell>,
    max_points: usize,
}

impl LookupTable {
    /// Build a table from cells laid out elevation-major.
    pub fn new(header: LookupHeader, cells: Vec<LookupCell>) -> TableResult<Self> {
        let expected = header.geometry.scan.num_cells();
        if cells.len() != expected {
            return Err(TableError::invalid(format!(
                "lookup table has {} cells, geometry needs {}",
                cells.len(),
                expected
            )));
        }

        let volume = header.geometry.grid.points_per_volume();
        if let Some(bad) = cells
            .iter()
            .filter_map(LookupCell::max_offset)
            .find(|&off| off as usize >= volume)
        {
            return Err(TableError::invalid(format!(
                "lookup offset {} outside grid of {} points",
                bad, volume
            )));
        }

        let max_points = cells.iter().map(LookupCell::num_points).max().unwrap_or(0);
        Ok(Self {
            header,
            cells,
            max_points,
        })
    }

    pub fn header(&self) -> &LookupHeader {
        &self.header
    }

    pub fn geometry(&self) -> &TableGeometry {
        &self.header.geometry
    }

    pub fn scan(&self) -> &ScanGeometry {
        &self.header.geometry.scan
    }

    pub fn grid(&self) -> &GridParams {
        &self.header.geometry.grid
    }

    /// Largest point count over all cells, for buffer sizing.
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn cell(&self, elev_idx: usize, az_idx: usize) -> Option<&LookupCell> {
        let scan = self.scan();
        if elev_idx >= scan.num_elevations() || az_idx >= scan.num_azimuths() {
            return None;
        }
        self.cells.get(scan.cell_index(elev_idx, az_idx))
    }

    pub fn cells(&self) -> &[LookupCell] {
        &self.cells
    }

    /// Serialize the table to a writer.
    pub fn save<W: Write>(&self, mut writer: W) -> TableResult<()> {
        let mut w = ByteWriter::new();
        w.bytes(MAGIC);
        w.u32(VERSION);
        w.i32(self.header.scan_type);
        w.f64(self.header.radar_lat);
        w.f64(self.header.radar_lon);
        w.f64(self.header.radar_alt_km);
        w.block(&self.header.geometry.to_bytes());
        w.u32(self.cells.len() as u32);
        for cell in &self.cells {
            match cell {
                LookupCell::Points(points) => {
                    w.u8(0);
                    w.u32(points.len() as u32);
                    for p in points {
                        w.u32(p.gate);
                        w.u32(p.offset);
                    }
                }
                LookupCell::Polar {
                    base_offset,
                    num_points,
                    last_data_gate,
                } => {
                    w.u8(1);
                    w.u32(*base_offset);
                    w.u32(*num_points);
                    w.u32(*last_data_gate);
                }
            }
        }
        writer.write_all(&w.finish_with_crc())?;
        Ok(())
    }

    /// Load a table from a reader.
    pub fn load<R: Read>(mut reader: R) -> TableResult<Self> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image)?;
        let body = verify_crc(&image)?;

        let mut r = ByteReader::new(body);
        read_preamble(&mut r, MAGIC, "PLUT", VERSION)?;

        let scan_type = r.i32()?;
        let radar_lat = r.f64()?;
        let radar_lon = r.f64()?;
        let radar_alt_km = r.f64()?;
        let geometry = TableGeometry::from_bytes(r.block()?)?;

        let n_cells = r.u32()? as usize;
        let mut cells = Vec::with_capacity(n_cells);
        for _ in 0..n_cells {
            let cell = match r.u8()? {
                0 => {
                    let count = r.u32()? as usize;
                    let mut points = Vec::with_capacity(count);
                    for _ in 0..count {
                        points.push(LookupPoint {
                            gate: r.u32()?,
                            offset: r.u32()?,
                        });
                    }
                    LookupCell::Points(points)
                }
                1 => LookupCell::Polar {
                    base_offset: r.u32()?,
                    num_points: r.u32()?,
                    last_data_gate: r.u32()?,
                },
                tag => return Err(TableError::invalid(format!("unknown cell tag {}", tag))),
            };
            cells.push(cell);
        }

        Self::new(
            LookupHeader {
                scan_type,
                radar_lat,
                radar_lon,
                radar_alt_km,
                geometry,
            },
            cells,
        )
    }

    /// Build a polar table: one plane per elevation, one row per azimuth,
    /// one column per gate.
    pub fn polar(
        scan_type: i32,
        radar: (f64, f64, f64),
        scan: ScanGeometry,
    ) -> TableResult<Self> {
        let n_elev = scan.num_elevations();
        let n_az = scan.num_azimuths();
        let n_gates = scan.num_gates;
        if n_gates == 0 {
            return Err(TableError::invalid("polar table needs at least one gate"));
        }

        let delta_az = match &scan.azimuths {
            AzimuthScheme::Regular { delta_az, .. } => *delta_az,
            AzimuthScheme::Explicit(_) => 360.0 / n_az.max(1) as f64,
        };
        let grid = GridParams {
            nx: n_gates,
            ny: n_az,
            nz: n_elev,
            dx: scan.gate_spacing_km,
            dy: delta_az,
            dz: 1.0,
            minx: scan.start_range_km,
            miny: scan.azimuth_center(0, 0).unwrap_or(0.0),
            minz: scan.elevations.first().copied().unwrap_or(0.0),
        };

        let mut cells = Vec::with_capacity(n_elev * n_az);
        for elev_idx in 0..n_elev {
            // explicit schemes may have fewer azimuths on some elevations
            let present = scan.azimuths_on(elev_idx);
            for az_idx in 0..n_az {
                let base = (elev_idx * n_az + az_idx) * n_gates;
                cells.push(LookupCell::Polar {
                    base_offset: base as u32,
                    num_points: if az_idx < present { n_gates as u32 } else { 0 },
                    last_data_gate: (n_gates - 1) as u32,
                });
            }
        }

        Self::new(header(scan_type, radar, scan, grid), cells)
    }

    /// Build a flat PPI table: one `nx` x `ny` plane per elevation, each
    /// grid point fed by the nearest gate along the beam it falls in.
    pub fn ppi(
        scan_type: i32,
        radar: (f64, f64, f64),
        mut scan: ScanGeometry,
        plane: GridParams,
    ) -> TableResult<Self> {
        scan.kind = GeometryKind::PpiFlat;
        let grid = GridParams {
            nz: scan.num_elevations(),
            dz: 1.0,
            minz: scan.elevations.first().copied().unwrap_or(0.0),
            ..plane
        };
        let mut cells = vec![Vec::new(); scan.num_cells()];
        let plane_size = grid.points_per_plane();

        for (elev_idx, elev) in scan.elevations.iter().enumerate() {
            let cos_elev = elev.to_radians().cos();
            for iy in 0..grid.ny {
                let y = grid.miny + iy as f64 * grid.dy;
                for ix in 0..grid.nx {
                    let x = grid.minx + ix as f64 * grid.dx;
                    let ground = x.hypot(y);
                    let slant = ground / cos_elev;
                    let Some(gate) = gate_for_range(&scan, slant) else {
                        continue;
                    };
                    let azimuth = x.atan2(y).to_degrees();
                    let Some(az_idx) = scan.azimuth_index(elev_idx, azimuth) else {
                        continue;
                    };
                    let offset = elev_idx * plane_size + iy * grid.nx + ix;
                    cells[scan.cell_index(elev_idx, az_idx)].push(LookupPoint {
                        gate,
                        offset: offset as u32,
                    });
                }
            }
        }

        let cells = cells.into_iter().map(LookupCell::Points).collect();
        Self::new(header(scan_type, radar, scan, grid), cells)
    }

    /// Build a 3-D Cartesian table using 4/3 earth-radius beam
    /// propagation. `grid.minz`/`dz` are heights (km) above the radar.
    pub fn cartesian(
        scan_type: i32,
        radar: (f64, f64, f64),
        mut scan: ScanGeometry,
        grid: GridParams,
    ) -> TableResult<Self> {
        scan.kind = GeometryKind::Cartesian;
        let re = EARTH_RADIUS_KM * 4.0 / 3.0;
        let limits = scan.elevation_limits();
        let mut cells = vec![Vec::new(); scan.num_cells()];
        let plane_size = grid.points_per_plane();

        for iz in 0..grid.nz {
            let h = grid.minz + iz as f64 * grid.dz;
            for iy in 0..grid.ny {
                let y = grid.miny + iy as f64 * grid.dy;
                for ix in 0..grid.nx {
                    let x = grid.minx + ix as f64 * grid.dx;
                    let ground = x.hypot(y);
                    let theta = ground / re;
                    let r_h = re + h;
                    let elevation = (r_h * theta.cos() - re).atan2(r_h * theta.sin()).to_degrees();
                    let slant = (r_h * r_h + re * re - 2.0 * re * r_h * theta.cos()).max(0.0).sqrt();

                    let Some(elev_idx) = scan.search_elevation(elevation, &limits) else {
                        continue;
                    };
                    let Some(gate) = gate_for_range(&scan, slant) else {
                        continue;
                    };
                    let Some(az_idx) = scan.azimuth_index(elev_idx, x.atan2(y).to_degrees())
                    else {
                        continue;
                    };
                    let offset = iz * plane_size + iy * grid.nx + ix;
                    cells[scan.cell_index(elev_idx, az_idx)].push(LookupPoint {
                        gate,
                        offset: offset as u32,
                    });
                }
            }
        }

        let cells = cells.into_iter().map(LookupCell::Points).collect();
        Self::new(header(scan_type, radar, scan, grid), cells)
    }
}

fn header(scan_type: i32, radar: (f64, f64, f64), scan: ScanGeometry, grid: GridParams) -> LookupHeader {
    LookupHeader {
        scan_type,
        radar_lat: radar.0,
        radar_lon: radar.1,
        radar_alt_km: radar.2,
        geometry: TableGeometry { scan, grid },
    }
}

fn gate_for_range(scan: &ScanGeometry, range_km: f64) -> Option<u32> {
    if scan.gate_spacing_km <= 0.0 {
        return None;
    }
    let gate = ((range_km - scan.start_range_km) / scan.gate_spacing_km).round();
    (gate >= 0.0 && (gate as usize) < scan.num_gates).then_some(gate as u32)
}
