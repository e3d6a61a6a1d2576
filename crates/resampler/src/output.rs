//! Output grid files and the volume output writer.
//!
//! # File format
//!
//! ```text
//! "RGRD" | u32 version | u32 header_len | JSON header
//! | per field: u8 compressed | u32 len | plane-major bytes (zlib if compressed)
//! ```
//!
//! All integers are little-endian. Complete volumes land at
//! `<output_dir>/<YYYYMMDD>/<HHMMSS>.rgrd` keyed by centroid time;
//! intermediate snapshots overwrite `<latest_dir>/latest.rgrd`. Each
//! directory carries a `_latest_data_info.json` sidecar pointing at the
//! newest file.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use polar_lut::{GeometryKind, TableGeometry};
use radar_common::{centroid_path, FieldParams, RadarParams, MISSING_BYTE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{CentroidMode, OutputConfig};
use crate::engine::{GridSnapshot, VolumeWindow};
use crate::error::WriteError;
use crate::tables::field_code;

pub const GRID_MAGIC: &[u8; 4] = b"RGRD";
pub const GRID_VERSION: u32 = 1;
pub const GRID_EXTENSION: &str = "rgrd";
pub const LATEST_FILE_NAME: &str = "latest.rgrd";
pub const LATEST_DATA_INFO: &str = "_latest_data_info.json";

type WriteResult<T> = Result<T, WriteError>;

// ============================================================================
// Headers
// ============================================================================

/// Meaning of the vertical level values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VlevelType {
    HeightKm,
    ElevationDeg,
}

impl VlevelType {
    fn for_kind(kind: GeometryKind) -> Self {
        if kind.planes_are_elevations() {
            Self::ElevationDeg
        } else {
            Self::HeightKm
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionType {
    /// Flat km grid centred on the sensor
    Flat,
    /// Range (km) by azimuth (degrees)
    Polar,
}

impl ProjectionType {
    fn for_kind(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Polar => Self::Polar,
            GeometryKind::Cartesian | GeometryKind::PpiFlat => Self::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterHeader {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub num_fields: usize,
    /// Level type of the measurement itself; beams are always elevations
    pub native_vlevel_type: VlevelType,
    pub vlevel_type: VlevelType,
    pub projection: ProjectionType,
    pub sensor_lat: f64,
    pub sensor_lon: f64,
    pub sensor_alt_km: f64,
    pub dataset_name: String,
    pub dataset_info: String,
    pub dataset_source: String,
    pub time_gen: DateTime<Utc>,
    pub time_begin: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub time_centroid: DateTime<Utc>,
    pub time_expire: DateTime<Utc>,
    /// Reference time of the first beam in the volume
    pub time_reference: Option<DateTime<Utc>>,
    pub volume_num: i32,
    pub scan_type: i32,
    /// True for snapshots of the accumulation grid
    pub intermediate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHeader {
    pub name: String,
    pub units: String,
    /// Known field code or -1
    pub field_code: i32,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub minx: f64,
    pub miny: f64,
    pub minz: f64,
    pub projection: ProjectionType,
    pub encoding: String,
    pub scale: f64,
    pub bias: f64,
    pub missing_value: u8,
    pub bad_value: u8,
    pub compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlevelHeader {
    pub level_type: VlevelType,
    pub levels: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    pub master: MasterHeader,
    pub fields: Vec<FieldHeader>,
    /// One per field
    pub vlevels: Vec<VlevelHeader>,
    pub radar_params: RadarParams,
    pub elevations: Vec<f64>,
}

/// Times stamped into a grid header.
#[derive(Debug, Clone, Copy)]
struct GridTimes {
    generated: DateTime<Utc>,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    centroid: DateTime<Utc>,
    expire: DateTime<Utc>,
    reference: Option<DateTime<Utc>>,
}

// ============================================================================
// Grid file
// ============================================================================

/// A decoded or ready-to-write grid file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGrid {
    pub header: GridHeader,
    /// Plane-major bytes, one vector per field
    pub data: Vec<Vec<u8>>,
}

impl OutputGrid {
    fn from_snapshot(
        snapshot: &GridSnapshot<'_>,
        dataset: &crate::config::DatasetInfo,
        times: GridTimes,
        intermediate: bool,
        compress: bool,
    ) -> Self {
        let geometry: &TableGeometry = snapshot.geometry;
        let grid = &geometry.grid;
        let kind = geometry.scan.kind;
        let projection = ProjectionType::for_kind(kind);
        let vlevel_type = VlevelType::for_kind(kind);
        let levels = geometry.plane_levels();
        let radar: &RadarParams = snapshot.radar;

        let master = MasterHeader {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            num_fields: snapshot.fields.len(),
            native_vlevel_type: VlevelType::ElevationDeg,
            vlevel_type,
            projection,
            sensor_lat: radar.latitude,
            sensor_lon: radar.longitude,
            sensor_alt_km: radar.altitude_km,
            dataset_name: dataset.name.clone(),
            dataset_info: dataset.info.clone(),
            dataset_source: dataset.source.clone(),
            time_gen: times.generated,
            time_begin: times.begin,
            time_end: times.end,
            time_centroid: times.centroid,
            time_expire: times.expire,
            time_reference: times.reference,
            volume_num: snapshot.volume_num,
            scan_type: snapshot.scan_type,
            intermediate,
        };

        let fields = snapshot
            .fields
            .iter()
            .map(|f: &FieldParams| FieldHeader {
                name: f.name.clone(),
                units: f.units.clone(),
                field_code: field_code(&f.name),
                nx: grid.nx,
                ny: grid.ny,
                nz: grid.nz,
                dx: grid.dx,
                dy: grid.dy,
                dz: grid.dz,
                minx: grid.minx,
                miny: grid.miny,
                minz: grid.minz,
                projection,
                encoding: "uint8".to_string(),
                scale: f.scale,
                bias: f.bias,
                missing_value: MISSING_BYTE,
                bad_value: MISSING_BYTE,
                compressed: compress,
            })
            .collect();

        let vlevels = snapshot
            .fields
            .iter()
            .map(|_| VlevelHeader {
                level_type: vlevel_type,
                levels: levels.clone(),
            })
            .collect();

        let data = (0..snapshot.fields.len())
            .map(|j| snapshot.grid.field(j).map(<[u8]>::to_vec).unwrap_or_default())
            .collect();

        Self {
            header: GridHeader {
                master,
                fields,
                vlevels,
                radar_params: radar.clone(),
                elevations: geometry.scan.elevations.clone(),
            },
            data,
        }
    }

    /// Serialize to the on-disk layout.
    pub fn encode(&self, compress: bool) -> WriteResult<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let mut out = Vec::with_capacity(
            12 + header.len() + self.data.iter().map(|d| d.len() + 5).sum::<usize>(),
        );
        out.extend_from_slice(GRID_MAGIC);
        out.extend_from_slice(&GRID_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);

        for field in &self.data {
            let bytes = if compress {
                deflate(field)
                    .map_err(|e| WriteError::Format(format!("compression failed: {}", e)))?
            } else {
                field.clone()
            };
            out.push(u8::from(compress));
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> WriteResult<Self> {
        let mut pos = 0usize;
        let magic = take(bytes, &mut pos, 4)?;
        if magic != GRID_MAGIC {
            return Err(WriteError::Format("bad magic".to_string()));
        }
        let version = read_u32(bytes, &mut pos)?;
        if version != GRID_VERSION {
            return Err(WriteError::Format(format!("unsupported version {}", version)));
        }
        let header_len = read_u32(bytes, &mut pos)? as usize;
        let header: GridHeader = serde_json::from_slice(take(bytes, &mut pos, header_len)?)?;

        let mut data = Vec::with_capacity(header.fields.len());
        for _ in 0..header.fields.len() {
            let compressed = take(bytes, &mut pos, 1)?[0] != 0;
            let len = read_u32(bytes, &mut pos)? as usize;
            let raw = take(bytes, &mut pos, len)?;
            let field = if compressed {
                let mut out = Vec::new();
                ZlibDecoder::new(raw)
                    .read_to_end(&mut out)
                    .map_err(|e| WriteError::Format(format!("decompression failed: {}", e)))?;
                out
            } else {
                raw.to_vec()
            };
            data.push(field);
        }
        if pos != bytes.len() {
            return Err(WriteError::Format("trailing bytes after field data".to_string()));
        }
        Ok(Self { header, data })
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> WriteResult<&'a [u8]> {
    let end = pos
        .checked_add(n)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| WriteError::Format("truncated grid file".to_string()))?;
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> WriteResult<u32> {
    let b = take(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read a grid file from disk.
pub fn read_grid(path: &Path) -> WriteResult<OutputGrid> {
    let bytes = fs::read(path).map_err(|e| WriteError::io(path, e))?;
    OutputGrid::decode(&bytes)
}

/// Sidecar pointing at the newest file in a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestDataInfo {
    pub unix_time: i64,
    pub iso_time: String,
    /// Path relative to the sidecar's directory
    pub file: String,
    pub dataset: String,
}

impl LatestDataInfo {
    fn new(centroid: DateTime<Utc>, file: String, dataset: &str) -> Self {
        Self {
            unix_time: centroid.timestamp(),
            iso_time: centroid.to_rfc3339(),
            file,
            dataset: dataset.to_string(),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for encoded grids and sidecars.
pub trait GridSink: Send {
    /// Write a grid, returning the number of bytes written.
    fn write_grid(&mut self, path: &Path, grid: &OutputGrid) -> WriteResult<u64>;

    fn write_sidecar(&mut self, dir: &Path, info: &LatestDataInfo) -> WriteResult<()>;
}

/// Writes grids to the local filesystem via temp file + rename.
#[derive(Debug, Clone)]
pub struct FileGridSink {
    compress: bool,
}

impl FileGridSink {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }
}

impl GridSink for FileGridSink {
    fn write_grid(&mut self, path: &Path, grid: &OutputGrid) -> WriteResult<u64> {
        let bytes = grid.encode(self.compress)?;
        write_atomic(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    fn write_sidecar(&mut self, dir: &Path, info: &LatestDataInfo) -> WriteResult<()> {
        let bytes = serde_json::to_vec_pretty(info)?;
        write_atomic(&dir.join(LATEST_DATA_INFO), &bytes)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> WriteResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| WriteError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| WriteError::io(path, e))
}

// ============================================================================
// Writer
// ============================================================================

/// Validates closed volumes and writes complete and intermediate grids.
pub struct VolumeOutputWriter {
    config: OutputConfig,
    sink: Box<dyn GridSink>,
}

impl VolumeOutputWriter {
    pub fn new(config: OutputConfig, sink: Box<dyn GridSink>) -> Self {
        Self { config, sink }
    }

    /// Writer backed by the local filesystem.
    pub fn to_files(config: OutputConfig) -> Self {
        let sink = FileGridSink::new(config.compress);
        Self::new(config, Box::new(sink))
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Validate a closed volume and write its grid keyed by centroid time.
    ///
    /// Rejections (see [`WriteError::is_rejection`]) write nothing.
    pub fn write_complete(
        &mut self,
        window: &VolumeWindow,
        snapshot: GridSnapshot<'_>,
        now: DateTime<Utc>,
    ) -> WriteResult<PathBuf> {
        let (Some(start), Some(end)) = (window.start_time, window.end_time) else {
            return Err(WriteError::NoData(format!(
                "volume {} has no beams",
                window.volume_num
            )));
        };

        let duration_secs = window.duration_secs().unwrap_or(0.0).abs();
        if duration_secs > self.config.max_volume_duration_secs {
            return Err(WriteError::DurationExceeded {
                duration_secs,
                max_secs: self.config.max_volume_duration_secs,
            });
        }

        if self.config.check_missing_beams {
            let missing = window.missing_beams();
            if missing > self.config.max_missing_beams {
                return Err(WriteError::TooManyMissingBeams {
                    missing,
                    expected: window.expected_beams,
                    max_missing: self.config.max_missing_beams,
                });
            }
        }

        let centroid = match self.config.centroid {
            CentroidMode::Midpoint => start + (end - start) / 2,
            CentroidMode::EndMinusAge { age_secs } => end - secs(age_secs),
        };
        let times = GridTimes {
            generated: now,
            begin: start,
            end,
            centroid,
            expire: end + (end - start),
            reference: window.reference_time,
        };

        let relative = format!("{}.{}", centroid_path(centroid), GRID_EXTENSION);
        let path = self.config.output_dir.join(&relative);
        let grid = OutputGrid::from_snapshot(
            &snapshot,
            &self.config.dataset,
            times,
            false,
            self.config.compress,
        );
        let bytes = self.sink.write_grid(&path, &grid)?;
        let info = LatestDataInfo::new(centroid, relative, &self.config.dataset.name);
        self.sink.write_sidecar(&self.config.output_dir, &info)?;

        info!(
            path = %path.display(),
            centroid = %centroid,
            volume = window.volume_num,
            beams = window.beam_count,
            bytes,
            "Wrote complete volume"
        );
        Ok(path)
    }

    /// Overwrite the latest snapshot from the accumulation grid. No
    /// duration or missing-beam validation is applied.
    pub fn write_intermediate(
        &mut self,
        latest: DateTime<Utc>,
        duration: Duration,
        snapshot: GridSnapshot<'_>,
        now: DateTime<Utc>,
    ) -> WriteResult<PathBuf> {
        let times = GridTimes {
            generated: now,
            begin: latest - duration,
            end: latest,
            centroid: latest,
            expire: latest + duration,
            reference: None,
        };
        let path = self.config.latest_dir.join(LATEST_FILE_NAME);
        let grid = OutputGrid::from_snapshot(
            &snapshot,
            &self.config.dataset,
            times,
            true,
            self.config.compress,
        );
        let bytes = self.sink.write_grid(&path, &grid)?;
        let info = LatestDataInfo::new(latest, LATEST_FILE_NAME.to_string(), &self.config.dataset.name);
        self.sink.write_sidecar(&self.config.latest_dir, &info)?;

        debug!(path = %path.display(), centroid = %latest, bytes, "Wrote intermediate grid");
        Ok(path)
    }
}

fn secs(s: f64) -> Duration {
    Duration::milliseconds((s * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VolumeStats;
    use crate::grid::{FieldGrid, GridDims};
    use radar_common::StreamMetadata;
    use std::sync::Arc;
    use test_utils::{base_time, dbz_field, polar_lookup, polar_scan, stream_metadata, vel_field};

    struct Fixture {
        geometry: TableGeometry,
        meta: Arc<StreamMetadata>,
        grid: FieldGrid,
    }

    impl Fixture {
        fn new() -> Self {
            let lut = polar_lookup(3, polar_scan(&[0.5, 1.5], 4, 3));
            let geometry = lut.geometry().clone();
            let meta = stream_metadata(vec![dbz_field(), vel_field()], 3, 3);
            let mut grid = FieldGrid::new(GridDims::new(2, &geometry.grid));
            for offset in 0..24 {
                grid.set(0, offset, offset as u8 + 1);
            }
            grid.set(1, 23, 200);
            Self { geometry, meta, grid }
        }

        fn snapshot(&self) -> GridSnapshot<'_> {
            GridSnapshot {
                geometry: &self.geometry,
                radar: &self.meta.radar,
                fields: &self.meta.fields,
                grid: &self.grid,
                scan_type: 3,
                volume_num: 12,
            }
        }
    }

    fn window(duration_secs: i64, beam_count: usize) -> VolumeWindow {
        let start = base_time();
        VolumeWindow {
            volume_num: 12,
            scan_type: 3,
            start_time: Some(start),
            end_time: Some(start + Duration::seconds(duration_secs)),
            reference_time: Some(start),
            beam_count,
            expected_beams: 8,
            min_elevation: Some(0.5),
            max_elevation: Some(1.5),
            stats: VolumeStats::default(),
        }
    }

    fn config(dir: &Path) -> OutputConfig {
        OutputConfig {
            output_dir: dir.join("volumes"),
            latest_dir: dir.join("latest"),
            max_volume_duration_secs: 600.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new();
        let mut writer = VolumeOutputWriter::to_files(config(dir.path()));

        let path = writer
            .write_complete(&window(300, 8), fx.snapshot(), base_time())
            .unwrap();
        // midpoint centroid: 12:02:30
        assert_eq!(path, dir.path().join("volumes/20240601/120230.rgrd"));

        let grid = read_grid(&path).unwrap();
        let master = &grid.header.master;
        assert_eq!((master.nx, master.ny, master.nz), (3, 4, 2));
        assert_eq!(master.vlevel_type, VlevelType::ElevationDeg);
        assert_eq!(master.projection, ProjectionType::Polar);
        assert_eq!(master.time_centroid, base_time() + Duration::seconds(150));
        assert_eq!(master.time_expire, base_time() + Duration::seconds(600));
        assert!(!master.intermediate);
        assert_eq!(grid.header.fields[0].field_code, 1);
        assert_eq!(grid.header.fields[1].scale, 0.5);
        assert_eq!(grid.header.vlevels[1].levels, vec![0.5, 1.5]);
        assert_eq!(grid.data[0], fx.grid.field(0).unwrap());
        assert_eq!(grid.data[1][23], 200);

        let sidecar: LatestDataInfo = serde_json::from_slice(
            &fs::read(dir.path().join("volumes").join(LATEST_DATA_INFO)).unwrap(),
        )
        .unwrap();
        assert_eq!(sidecar.file, "20240601/120230.rgrd");
        assert_eq!(sidecar.unix_time, master.time_centroid.timestamp());
    }

    #[test]
    fn test_duration_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new();
        let mut writer = VolumeOutputWriter::to_files(config(dir.path()));

        let err = writer
            .write_complete(&window(601, 8), fx.snapshot(), base_time())
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(matches!(err, WriteError::DurationExceeded { .. }));
        assert!(!dir.path().join("volumes").exists());

        assert!(writer.write_complete(&window(600, 8), fx.snapshot(), base_time()).is_ok());
        assert!(dir.path().join("volumes/20240601/120500.rgrd").exists());
    }

    #[test]
    fn test_missing_beam_check() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new();
        let mut cfg = config(dir.path());
        cfg.check_missing_beams = true;
        cfg.max_missing_beams = 2;
        let mut writer = VolumeOutputWriter::to_files(cfg);

        assert!(writer.write_complete(&window(60, 6), fx.snapshot(), base_time()).is_ok());
        let err = writer
            .write_complete(&window(60, 5), fx.snapshot(), base_time())
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::TooManyMissingBeams {
                missing: 3,
                expected: 8,
                max_missing: 2
            }
        ));
    }

    #[test]
    fn test_empty_volume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new();
        let mut writer = VolumeOutputWriter::to_files(config(dir.path()));
        let mut w = window(0, 0);
        w.start_time = None;
        w.end_time = None;
        let err = writer.write_complete(&w, fx.snapshot(), base_time()).unwrap_err();
        assert!(matches!(err, WriteError::NoData(_)));
    }

    #[test]
    fn test_end_minus_age_centroid() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new();
        let mut cfg = config(dir.path());
        cfg.centroid = CentroidMode::EndMinusAge { age_secs: 30.0 };
        let mut writer = VolumeOutputWriter::to_files(cfg);
        let path = writer
            .write_complete(&window(300, 8), fx.snapshot(), base_time())
            .unwrap();
        assert!(path.ends_with("20240601/120430.rgrd"));
    }

    #[test]
    fn test_intermediate_overwrites_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new();
        let mut writer = VolumeOutputWriter::to_files(config(dir.path()));
        let latest = base_time() + Duration::seconds(42);

        let path = writer
            .write_intermediate(latest, Duration::seconds(60), fx.snapshot(), latest)
            .unwrap();
        assert_eq!(path, dir.path().join("latest").join(LATEST_FILE_NAME));

        fx.grid.set(0, 0, 99);
        writer
            .write_intermediate(latest, Duration::seconds(60), fx.snapshot(), latest)
            .unwrap();
        let grid = read_grid(&path).unwrap();
        assert!(grid.header.master.intermediate);
        assert_eq!(grid.header.master.time_centroid, latest);
        assert_eq!(grid.header.master.time_begin, latest - Duration::seconds(60));
        assert_eq!(grid.data[0][0], 99);
        assert!(dir.path().join("latest").join(LATEST_DATA_INFO).exists());
    }

    #[test]
    fn test_uncompressed_and_corrupt_files() {
        let fx = Fixture::new();
        let grid = OutputGrid::from_snapshot(
            &fx.snapshot(),
            &Default::default(),
            GridTimes {
                generated: base_time(),
                begin: base_time(),
                end: base_time(),
                centroid: base_time(),
                expire: base_time(),
                reference: None,
            },
            false,
            false,
        );
        let bytes = grid.encode(false).unwrap();
        assert_eq!(OutputGrid::decode(&bytes).unwrap(), grid);

        assert!(matches!(
            OutputGrid::decode(&bytes[..bytes.len() - 1]),
            Err(WriteError::Format(_))
        ));
        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(OutputGrid::decode(&bad).is_err());
    }
}
