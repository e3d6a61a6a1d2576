//! Volume and accumulation grids plus the per-volume written-cell mask.

use polar_lut::GridParams;
use radar_common::MISSING_BYTE;

/// Shape shared by the volume and accumulation grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridDims {
    pub num_fields: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    pub fn new(num_fields: usize, grid: &GridParams) -> Self {
        Self {
            num_fields,
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
        }
    }

    pub fn points_per_plane(&self) -> usize {
        self.nx * self.ny
    }

    /// Points in one field's volume.
    pub fn points_per_field(&self) -> usize {
        self.points_per_plane() * self.nz
    }

    pub fn total_len(&self) -> usize {
        self.points_per_field() * self.num_fields
    }
}

/// One byte grid, field-major: `data[field * points_per_field + offset]`.
#[derive(Debug, Clone, Default)]
pub struct FieldGrid {
    dims: GridDims,
    data: Vec<u8>,
}

impl FieldGrid {
    pub fn new(dims: GridDims) -> Self {
        Self {
            dims,
            data: vec![MISSING_BYTE; dims.total_len()],
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn clear(&mut self) {
        self.data.fill(MISSING_BYTE);
    }

    /// Plane-major bytes of one field.
    pub fn field(&self, field: usize) -> Option<&[u8]> {
        let n = self.dims.points_per_field();
        (field < self.dims.num_fields).then(|| &self.data[field * n..(field + 1) * n])
    }

    #[inline]
    pub fn get(&self, field: usize, offset: usize) -> Option<u8> {
        self.index(field, offset).map(|i| self.data[i])
    }

    /// Set one value; false if the position is outside the grid.
    #[inline]
    pub fn set(&mut self, field: usize, offset: usize, value: u8) -> bool {
        match self.index(field, offset) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Count of non-missing values in one field.
    pub fn coverage(&self, field: usize) -> usize {
        self.field(field)
            .map(|f| f.iter().filter(|&&v| v != MISSING_BYTE).count())
            .unwrap_or(0)
    }

    #[inline]
    fn index(&self, field: usize, offset: usize) -> Option<usize> {
        let n = self.dims.points_per_field();
        (field < self.dims.num_fields && offset < n).then(|| field * n + offset)
    }
}

/// The volume-local grid and the continuously accumulating grid.
///
/// Both always share identical dimensions. The volume grid is cleared at
/// every volume start; the accumulation grid is cleared only when the
/// dimensions change.
#[derive(Debug, Clone, Default)]
pub struct VolumeGrids {
    volume: FieldGrid,
    accum: FieldGrid,
}

impl VolumeGrids {
    pub fn dims(&self) -> GridDims {
        self.volume.dims()
    }

    /// Resize both grids if `dims` differs. Returns true if reallocated.
    pub fn ensure_dims(&mut self, dims: GridDims) -> bool {
        if self.volume.dims() == dims && !self.volume.data.is_empty() {
            return false;
        }
        self.volume = FieldGrid::new(dims);
        self.accum = FieldGrid::new(dims);
        true
    }

    /// Reset the volume grid for a new volume.
    pub fn start_volume(&mut self) {
        self.volume.clear();
    }

    /// Write one point's values (one per output field) into both grids.
    /// Returns false if the offset is outside the grid.
    #[inline]
    pub fn scatter(&mut self, offset: usize, values: &[u8]) -> bool {
        if offset >= self.dims().points_per_field() {
            return false;
        }
        for (field, &v) in values.iter().enumerate() {
            self.volume.set(field, offset, v);
            self.accum.set(field, offset, v);
        }
        true
    }

    pub fn volume(&self) -> &FieldGrid {
        &self.volume
    }

    pub fn accum(&self) -> &FieldGrid {
        &self.accum
    }
}

/// One flag per (elevation, azimuth) cell, set when the cell is written.
#[derive(Debug, Clone, Default)]
pub struct BeamWrittenMask {
    num_elevations: usize,
    num_azimuths: usize,
    flags: Vec<bool>,
}

impl BeamWrittenMask {
    pub fn new(num_elevations: usize, num_azimuths: usize) -> Self {
        Self {
            num_elevations,
            num_azimuths,
            flags: vec![false; num_elevations * num_azimuths],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_elevations, self.num_azimuths)
    }

    pub fn clear(&mut self) {
        self.flags.fill(false);
    }

    pub fn is_set(&self, elev_idx: usize, az_idx: usize) -> bool {
        self.index(elev_idx, az_idx)
            .map(|i| self.flags[i])
            .unwrap_or(false)
    }

    pub fn set(&mut self, elev_idx: usize, az_idx: usize) {
        if let Some(i) = self.index(elev_idx, az_idx) {
            self.flags[i] = true;
        }
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    fn index(&self, elev_idx: usize, az_idx: usize) -> Option<usize> {
        (elev_idx < self.num_elevations && az_idx < self.num_azimuths)
            .then(|| elev_idx * self.num_azimuths + az_idx)
    }
}
