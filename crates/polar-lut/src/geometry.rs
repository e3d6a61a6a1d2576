//! Scan geometry and output grid definitions.

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{TableError, TableResult};

/// How the output grid relates to the polar scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Regular 3-D Cartesian grid; planes are heights.
    Cartesian,
    /// One flat 2-D plane per elevation angle.
    PpiFlat,
    /// Native polar layout; one plane per elevation, gates contiguous.
    Polar,
}

impl GeometryKind {
    fn code(self) -> u8 {
        match self {
            Self::Cartesian => 0,
            Self::PpiFlat => 1,
            Self::Polar => 2,
        }
    }

    fn from_code(code: u8) -> TableResult<Self> {
        match code {
            0 => Ok(Self::Cartesian),
            1 => Ok(Self::PpiFlat),
            2 => Ok(Self::Polar),
            other => Err(TableError::invalid(format!("unknown geometry kind {}", other))),
        }
    }

    /// True if vertical levels are elevation angles rather than heights.
    pub fn planes_are_elevations(self) -> bool {
        !matches!(self, Self::Cartesian)
    }
}

/// Azimuth indexing scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AzimuthScheme {
    /// Fixed angular step: index = floor((azimuth + offset) / delta), wrapped.
    Regular {
        num_azimuths: usize,
        delta_az: f64,
        az_offset: f64,
    },
    /// Explicit azimuth centers, one table per elevation.
    Explicit(Vec<Vec<f64>>),
}

/// Elevation/azimuth/gate layout of a scan strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanGeometry {
    pub kind: GeometryKind,
    /// Elevation angles (degrees), ascending
    pub elevations: Vec<f64>,
    pub azimuths: AzimuthScheme,
    pub start_range_km: f64,
    pub gate_spacing_km: f64,
    pub num_gates: usize,
}

impl ScanGeometry {
    pub fn num_elevations(&self) -> usize {
        self.elevations.len()
    }

    /// Azimuth cells per elevation (the widest explicit table for
    /// explicit schemes).
    pub fn num_azimuths(&self) -> usize {
        match &self.azimuths {
            AzimuthScheme::Regular { num_azimuths, .. } => *num_azimuths,
            AzimuthScheme::Explicit(tables) => tables.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Total (elevation, azimuth) cells.
    pub fn num_cells(&self) -> usize {
        self.num_elevations() * self.num_azimuths()
    }

    /// Azimuth cells actually present on one elevation.
    pub fn azimuths_on(&self, elev_idx: usize) -> usize {
        if elev_idx >= self.num_elevations() {
            return 0;
        }
        match &self.azimuths {
            AzimuthScheme::Regular { num_azimuths, .. } => *num_azimuths,
            AzimuthScheme::Explicit(tables) => tables.get(elev_idx).map_or(0, Vec::len),
        }
    }

    /// Beams making up one complete volume.
    pub fn expected_beams(&self) -> usize {
        (0..self.num_elevations()).map(|e| self.azimuths_on(e)).sum()
    }

    /// Flat cell index.
    #[inline]
    pub fn cell_index(&self, elev_idx: usize, az_idx: usize) -> usize {
        elev_idx * self.num_azimuths() + az_idx
    }

    /// Elevation bin limits: `n + 1` edges halfway between adjacent angles,
    /// extended by half a step (or half a degree) at either end.
    pub fn elevation_limits(&self) -> Vec<f64> {
        let e = &self.elevations;
        match e.len() {
            0 => Vec::new(),
            1 => vec![e[0] - 0.5, e[0] + 0.5],
            n => {
                let mut limits = Vec::with_capacity(n + 1);
                limits.push(e[0] - (e[1] - e[0]) / 2.0);
                for i in 1..n {
                    limits.push((e[i - 1] + e[i]) / 2.0);
                }
                limits.push(e[n - 1] + (e[n - 1] - e[n - 2]) / 2.0);
                limits
            }
        }
    }

    /// Search the elevation limits for the bin containing `elevation`.
    pub fn search_elevation(&self, elevation: f64, limits: &[f64]) -> Option<usize> {
        if limits.len() < 2 || elevation < limits[0] || elevation > limits[limits.len() - 1] {
            return None;
        }
        let idx = limits
            .windows(2)
            .position(|w| elevation >= w[0] && elevation < w[1])
            .unwrap_or(limits.len() - 2);
        Some(idx)
    }

    /// Azimuth cell index for a beam at `azimuth` degrees on elevation
    /// `elev_idx`, or `None` if no cell covers it.
    pub fn azimuth_index(&self, elev_idx: usize, azimuth: f64) -> Option<usize> {
        let az = azimuth.rem_euclid(360.0);
        match &self.azimuths {
            AzimuthScheme::Regular {
                num_azimuths,
                delta_az,
                az_offset,
            } => {
                if *num_azimuths == 0 || *delta_az <= 0.0 {
                    return None;
                }
                let bucket = ((az + az_offset) / delta_az).floor() as i64;
                Some(bucket.rem_euclid(*num_azimuths as i64) as usize)
            }
            AzimuthScheme::Explicit(tables) => {
                let table = tables.get(elev_idx)?;
                if table.is_empty() {
                    return None;
                }
                let (idx, dist) = table
                    .iter()
                    .enumerate()
                    .map(|(i, &center)| (i, circular_distance(az, center)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;
                let half_spacing = 180.0 / table.len() as f64;
                (dist <= half_spacing).then_some(idx)
            }
        }
    }

    /// Center azimuth for a cell, used by table builders.
    pub fn azimuth_center(&self, elev_idx: usize, az_idx: usize) -> Option<f64> {
        match &self.azimuths {
            AzimuthScheme::Regular {
                num_azimuths,
                delta_az,
                az_offset,
            } => (az_idx < *num_azimuths)
                .then(|| ((az_idx as f64 + 0.5) * delta_az - az_offset).rem_euclid(360.0)),
            AzimuthScheme::Explicit(tables) => tables.get(elev_idx)?.get(az_idx).copied(),
        }
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.kind.code());
        w.u32(self.elevations.len() as u32);
        for &e in &self.elevations {
            w.f64(e);
        }
        match &self.azimuths {
            AzimuthScheme::Regular {
                num_azimuths,
                delta_az,
                az_offset,
            } => {
                w.u8(0);
                w.u32(*num_azimuths as u32);
                w.f64(*delta_az);
                w.f64(*az_offset);
            }
            AzimuthScheme::Explicit(tables) => {
                w.u8(1);
                w.u32(tables.len() as u32);
                for table in tables {
                    w.u32(table.len() as u32);
                    for &az in table {
                        w.f64(az);
                    }
                }
            }
        }
        w.f64(self.start_range_km);
        w.f64(self.gate_spacing_km);
        w.u32(self.num_gates as u32);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> TableResult<Self> {
        let kind = GeometryKind::from_code(r.u8()?)?;
        let n_elev = r.u32()? as usize;
        let elevations = (0..n_elev).map(|_| r.f64()).collect::<TableResult<Vec<_>>>()?;
        let azimuths = match r.u8()? {
            0 => AzimuthScheme::Regular {
                num_azimuths: r.u32()? as usize,
                delta_az: r.f64()?,
                az_offset: r.f64()?,
            },
            1 => {
                let n_tables = r.u32()? as usize;
                let mut tables = Vec::with_capacity(n_tables);
                for _ in 0..n_tables {
                    let len = r.u32()? as usize;
                    tables.push((0..len).map(|_| r.f64()).collect::<TableResult<Vec<_>>>()?);
                }
                AzimuthScheme::Explicit(tables)
            }
            other => {
                return Err(TableError::invalid(format!("unknown azimuth scheme {}", other)));
            }
        };
        Ok(Self {
            kind,
            elevations,
            azimuths,
            start_range_km: r.f64()?,
            gate_spacing_km: r.f64()?,
            num_gates: r.u32()? as usize,
        })
    }
}

fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Output grid definition. Units are km for Cartesian/PPI grids; for
/// polar grids x is gate range (km) and y is azimuth (degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub minx: f64,
    pub miny: f64,
    pub minz: f64,
}

impl GridParams {
    pub fn points_per_plane(&self) -> usize {
        self.nx * self.ny
    }

    /// Points in one field's volume.
    pub fn points_per_volume(&self) -> usize {
        self.points_per_plane() * self.nz
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.u32(self.nx as u32);
        w.u32(self.ny as u32);
        w.u32(self.nz as u32);
        for v in [self.dx, self.dy, self.dz, self.minx, self.miny, self.minz] {
            w.f64(v);
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> TableResult<Self> {
        Ok(Self {
            nx: r.u32()? as usize,
            ny: r.u32()? as usize,
            nz: r.u32()? as usize,
            dx: r.f64()?,
            dy: r.f64()?,
            dz: r.f64()?,
            minx: r.f64()?,
            miny: r.f64()?,
            minz: r.f64()?,
        })
    }
}

/// Scan geometry plus the grid it maps onto. Stored identically in lookup
/// and clutter tables; the two must match byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGeometry {
    pub scan: ScanGeometry,
    pub grid: GridParams,
}

impl TableGeometry {
    /// Canonical byte encoding, used both on disk and for the
    /// lookup/clutter consistency check.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.scan.encode(&mut w);
        self.grid.encode(&mut w);
        w.into_inner()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> TableResult<Self> {
        let mut r = ByteReader::new(bytes);
        let scan = ScanGeometry::decode(&mut r)?;
        let grid = GridParams::decode(&mut r)?;
        if !r.is_empty() {
            return Err(TableError::invalid("trailing bytes in geometry block"));
        }
        Ok(Self { scan, grid })
    }

    /// Vertical level value for each plane: elevation angle for PPI and
    /// polar grids, height for Cartesian grids.
    pub fn plane_levels(&self) -> Vec<f64> {
        if self.scan.kind.planes_are_elevations() {
            self.scan.elevations.clone()
        } else {
            (0..self.grid.nz)
                .map(|i| self.grid.minz + i as f64 * self.grid.dz)
                .collect()
        }
    }
}
