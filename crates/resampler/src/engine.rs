//! Volume preparation and per-beam resampling.
//!
//! The engine moves through `Idle → Preparing → Accepting → Closing → Idle`
//! once per volume. Preparation resolves output fields, validates the
//! tables against the live stream and sizes the grids; each accepted beam
//! is indexed, gap-filled, filtered and scattered into both grids.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use polar_lut::{GeometryTable, TableGeometry};
use radar_common::{seconds_between, Beam, FieldParams, RadarParams, StreamMetadata};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::{OutputFields, ResampleConfig};
use crate::error::{EngineError, Result};
use crate::filter::{
    BeamContext, BeamFilterPipeline, FilterStats, NoiseTable, PipelineOptions, QualityGate,
    TimeCorrection,
};
use crate::grid::{BeamWrittenMask, FieldGrid, GridDims, VolumeGrids};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Preparing,
    Accepting,
    Closing,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Accepting => "accepting",
            Self::Closing => "closing",
        }
    }
}

/// Why a beam was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload does not match the stream layout
    Malformed,
    /// Elevation outside every table bin
    NoElevation,
    /// Azimuth or cell outside the table
    OutOfRange,
    /// Cell already written this volume
    Duplicate,
}

/// Result of processing one beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamOutcome {
    /// The beam was written; `interpolated` if a gap beam was written too.
    Written { interpolated: bool },
    Dropped(DropReason),
}

/// Per-volume counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VolumeStats {
    pub beams_written: usize,
    pub beams_interpolated: usize,
    pub dropped_malformed: usize,
    pub dropped_no_elevation: usize,
    pub dropped_out_of_range: usize,
    pub dropped_duplicate: usize,
    pub points_scattered: usize,
    pub points_out_of_grid: usize,
    pub gates_despiked: usize,
    pub points_thresholded: usize,
    pub points_time_corrected: usize,
    pub points_clutter_suppressed: usize,
}

impl VolumeStats {
    fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Malformed => self.dropped_malformed += 1,
            DropReason::NoElevation => self.dropped_no_elevation += 1,
            DropReason::OutOfRange => self.dropped_out_of_range += 1,
            DropReason::Duplicate => self.dropped_duplicate += 1,
        }
    }

    fn merge_filter(&mut self, f: FilterStats) {
        self.gates_despiked = f.gates_despiked;
        self.points_thresholded = f.points_thresholded;
        self.points_time_corrected = f.points_time_corrected;
        self.points_clutter_suppressed = f.points_clutter_suppressed;
    }
}

/// Time span and beam accounting of one volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeWindow {
    pub volume_num: i32,
    pub scan_type: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Reference time of the first beam written
    pub reference_time: Option<DateTime<Utc>>,
    /// Beams written, including interpolated ones
    pub beam_count: usize,
    /// Beams in a complete volume for the active geometry
    pub expected_beams: usize,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
    pub stats: VolumeStats,
}

impl VolumeWindow {
    fn open(volume_num: i32, scan_type: i32, expected_beams: usize) -> Self {
        Self {
            volume_num,
            scan_type,
            start_time: None,
            end_time: None,
            reference_time: None,
            beam_count: 0,
            expected_beams,
            min_elevation: None,
            max_elevation: None,
            stats: VolumeStats::default(),
        }
    }

    fn record_beam(&mut self, time: DateTime<Utc>, reference_time: DateTime<Utc>, elevation: f64) {
        self.start_time = Some(self.start_time.map_or(time, |t| t.min(time)));
        self.end_time = Some(self.end_time.map_or(time, |t| t.max(time)));
        self.reference_time.get_or_insert(reference_time);
        self.min_elevation = Some(self.min_elevation.map_or(elevation, |e| e.min(elevation)));
        self.max_elevation = Some(self.max_elevation.map_or(elevation, |e| e.max(elevation)));
        self.beam_count += 1;
    }

    /// Seconds between the first and last beam.
    pub fn duration_secs(&self) -> Option<f64> {
        Some(seconds_between(self.start_time?, self.end_time?))
    }

    pub fn missing_beams(&self) -> usize {
        self.expected_beams.saturating_sub(self.beam_count)
    }
}

/// Read-only view of one grid plus the metadata needed to describe it.
#[derive(Debug, Clone, Copy)]
pub struct GridSnapshot<'a> {
    pub geometry: &'a TableGeometry,
    pub radar: &'a RadarParams,
    pub fields: &'a [FieldParams],
    pub grid: &'a FieldGrid,
    pub scan_type: i32,
    pub volume_num: i32,
}

/// State fixed at the last successful preparation.
#[derive(Debug, Clone)]
struct PreparedVolume {
    meta: Arc<StreamMetadata>,
    geometry: TableGeometry,
    output_fields: Vec<FieldParams>,
    volume_num: i32,
}

/// Raw payload of the last indexed beam, for gap interpolation.
#[derive(Debug, Clone)]
struct PreviousBeam {
    elev_idx: usize,
    az_idx: usize,
    data: Vec<u8>,
}

/// Timing carried by a beam into the write path.
#[derive(Debug, Clone, Copy)]
struct BeamTiming {
    time: DateTime<Utc>,
    reference_time: DateTime<Utc>,
    elevation: f64,
}

pub struct ResampleEngine {
    config: ResampleConfig,
    geometry: GeometryTable,
    state: EngineState,
    prepared: Option<PreparedVolume>,
    grids: VolumeGrids,
    mask: BeamWrittenMask,
    pipeline: Option<BeamFilterPipeline>,
    window: Option<VolumeWindow>,
    previous: Option<PreviousBeam>,
    latest_time: Option<DateTime<Utc>>,
}

impl ResampleEngine {
    pub fn new(config: ResampleConfig, geometry: GeometryTable) -> Self {
        Self {
            config,
            geometry,
            state: EngineState::Idle,
            prepared: None,
            grids: VolumeGrids::default(),
            mask: BeamWrittenMask::default(),
            pipeline: None,
            window: None,
            previous: None,
            latest_time: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    pub fn geometry(&self) -> &GeometryTable {
        &self.geometry
    }

    /// Window of the open (or closing) volume.
    pub fn window(&self) -> Option<&VolumeWindow> {
        self.window.as_ref()
    }

    /// Time of the newest beam written since start-up.
    pub fn latest_data_time(&self) -> Option<DateTime<Utc>> {
        self.latest_time
    }

    pub fn grids(&self) -> &VolumeGrids {
        &self.grids
    }

    pub fn output_fields(&self) -> &[FieldParams] {
        self.prepared
            .as_ref()
            .map(|p| p.output_fields.as_slice())
            .unwrap_or(&[])
    }

    /// Swap tables for a new scan type. Not allowed while a volume is open.
    pub fn update_geometry(&mut self, scan_type: i32) -> Result<bool> {
        if self.state == EngineState::Accepting || self.state == EngineState::Preparing {
            return Err(self.state_error("idle"));
        }
        Ok(self.geometry.update(scan_type)?)
    }

    /// Prepare for a new volume from the first beam's stream metadata.
    ///
    /// On failure the engine is left idle and no beams are accepted until
    /// the next successful preparation.
    pub fn prepare_volume(&mut self, meta: &Arc<StreamMetadata>, volume_num: i32) -> Result<()> {
        match self.state {
            EngineState::Preparing => return Err(self.state_error("idle")),
            EngineState::Accepting => {
                debug!(
                    volume = self.window.as_ref().map(|w| w.volume_num),
                    "Discarding open volume"
                );
            }
            EngineState::Idle | EngineState::Closing => {}
        }

        self.state = EngineState::Preparing;
        match self.prepare(meta, volume_num) {
            Ok(()) => {
                self.state = EngineState::Accepting;
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Idle;
                self.window = None;
                self.pipeline = None;
                Err(e)
            }
        }
    }

    fn prepare(&mut self, meta: &Arc<StreamMetadata>, volume_num: i32) -> Result<()> {
        let (input_indices, output_fields) = self.resolve_fields(meta)?;
        let dbz_idx = meta.field_index(&self.config.dbz_field);

        self.geometry.check_geometry(meta, dbz_idx)?;

        let table_geometry = self.geometry.lookup().geometry().clone();
        let scan = &table_geometry.scan;

        let dims = GridDims::new(output_fields.len(), &table_geometry.grid);
        if self.grids.ensure_dims(dims) {
            info!(
                fields = dims.num_fields,
                nx = dims.nx,
                ny = dims.ny,
                nz = dims.nz,
                "Allocated volume and accumulation grids"
            );
        }

        let mask_shape = (scan.num_elevations(), scan.num_azimuths());
        if self.mask.shape() != mask_shape {
            self.mask = BeamWrittenMask::new(mask_shape.0, mask_shape.1);
        } else {
            self.mask.clear();
        }

        let quality = if self.config.needs_noise_table() {
            match meta.field_index(&self.config.despike.quality_field) {
                Some(field) => {
                    let num_gates = meta.radar.num_gates.max(scan.num_gates);
                    let noise = NoiseTable::compute(
                        &self.config.despike,
                        &meta.radar,
                        num_gates,
                        &meta.fields[field],
                    );
                    Some(QualityGate { field, noise })
                }
                None => {
                    warn!(
                        field = %self.config.despike.quality_field,
                        "Quality field not in input stream, despiking and thresholding disabled"
                    );
                    None
                }
            }
        } else {
            None
        };

        let clutter_dbz_field = match (self.geometry.clutter(), dbz_idx) {
            (Some(_), Some(idx)) => Some(idx),
            (Some(_), None) => {
                warn!(
                    field = %self.config.dbz_field,
                    "Reflectivity field not in input stream, clutter removal skipped"
                );
                None
            }
            (None, _) => None,
        };

        let time_correction = self.time_correction(&input_indices, meta);

        self.pipeline = Some(BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: meta.num_fields(),
            input_indices,
            max_points: self.geometry.lookup().max_points(),
            quality,
            despike_min_run: self.config.despike.enabled.then_some(self.config.despike.min_run),
            threshold_points: self.config.threshold_points,
            time_correction,
            clutter_dbz_field,
        }));

        self.grids.start_volume();
        self.previous = None;
        self.window = Some(VolumeWindow::open(
            volume_num,
            meta.scan_type,
            scan.expected_beams(),
        ));
        info!(
            volume = volume_num,
            scan_type = meta.scan_type,
            fields = output_fields.len(),
            table = %self.geometry.lookup_path().display(),
            "Prepared volume"
        );

        self.prepared = Some(PreparedVolume {
            meta: Arc::clone(meta),
            geometry: table_geometry,
            output_fields,
            volume_num,
        });
        Ok(())
    }

    /// Input index and parameters of every output field, time field last
    /// if it was appended.
    fn resolve_fields(&self, meta: &StreamMetadata) -> Result<(Vec<usize>, Vec<FieldParams>)> {
        let mut indices: Vec<usize> = match &self.config.output_fields {
            OutputFields::All => (0..meta.num_fields()).collect(),
            OutputFields::List(names) => names
                .iter()
                .map(|name| {
                    meta.field_index(name)
                        .ok_or_else(|| EngineError::MissingField(name.clone()))
                })
                .collect::<Result<_>>()?,
        };

        if let Some(time) = self.config.time_field.as_ref().filter(|t| t.include) {
            let idx = meta
                .field_index(&time.name)
                .ok_or_else(|| EngineError::MissingTimeField(time.name.clone()))?;
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }

        let params = indices.iter().map(|&i| meta.fields[i].clone()).collect();
        Ok((indices, params))
    }

    fn time_correction(&self, input_indices: &[usize], meta: &StreamMetadata) -> Option<TimeCorrection> {
        let time = self.config.time_field.as_ref()?;
        let Some(input) = meta.field_index(&time.name) else {
            debug!(field = %time.name, "Time field not in input stream, no time correction");
            return None;
        };
        let output_position = input_indices.iter().position(|&i| i == input)?;
        let scale_secs = meta.fields[input].scale;
        if scale_secs == 0.0 {
            warn!(field = %time.name, "Time field has zero scale, no time correction");
            return None;
        }
        Some(TimeCorrection {
            output_position,
            scale_secs,
        })
    }

    /// Index, gap-fill, filter and scatter one beam.
    pub fn process_beam(&mut self, beam: Beam) -> Result<BeamOutcome> {
        if self.state != EngineState::Accepting {
            return Err(self.state_error("accepting"));
        }

        let expected_fields = self
            .prepared
            .as_ref()
            .map(|p| p.meta.num_fields())
            .unwrap_or(0);
        if beam.num_fields() != expected_fields || beam.validate().is_err() {
            trace!(
                azimuth = beam.azimuth,
                elevation = beam.elevation,
                "Dropping malformed beam"
            );
            return Ok(self.drop_beam(DropReason::Malformed));
        }

        let Some(elev_idx) = self.geometry.elevation_index(beam.elevation) else {
            trace!(elevation = beam.elevation, "No elevation bin for beam");
            self.previous = None;
            return Ok(self.drop_beam(DropReason::NoElevation));
        };
        let Some(az_idx) = self.geometry.azimuth_index(elev_idx, beam.azimuth) else {
            trace!(azimuth = beam.azimuth, elev_idx, "No azimuth cell for beam");
            return Ok(self.drop_beam(DropReason::OutOfRange));
        };

        let timing = BeamTiming {
            time: beam.time,
            reference_time: beam.reference_time,
            elevation: beam.elevation,
        };

        let mut interpolated = false;
        if let Some(prev) = self.previous.take() {
            let n_az = self.geometry.scan().azimuths_on(elev_idx);
            let gap = (prev.elev_idx == elev_idx)
                .then(|| skipped_index(prev.az_idx, az_idx, n_az))
                .flatten();
            if let Some(missed) = gap {
                if prev.data.len() == beam.data.len() {
                    let data = average_bytes(&prev.data, &beam.data);
                    match self.write_beam(elev_idx, missed, data, timing) {
                        Ok(()) => {
                            interpolated = true;
                            if let Some(w) = self.window.as_mut() {
                                w.stats.beams_interpolated += 1;
                            }
                            trace!(elev_idx, az_idx = missed, "Filled single missed beam");
                        }
                        Err(reason) => {
                            trace!(elev_idx, az_idx = missed, ?reason, "Gap beam not written");
                        }
                    }
                }
            }
        }

        self.previous = Some(PreviousBeam {
            elev_idx,
            az_idx,
            data: beam.data.clone(),
        });

        let outcome = match self.write_beam(elev_idx, az_idx, beam.data, timing) {
            Ok(()) => BeamOutcome::Written { interpolated },
            Err(reason) => self.drop_beam(reason),
        };
        Ok(outcome)
    }

    fn drop_beam(&mut self, reason: DropReason) -> BeamOutcome {
        if let Some(w) = self.window.as_mut() {
            w.stats.record_drop(reason);
        }
        BeamOutcome::Dropped(reason)
    }

    /// Run the pipeline on one beam payload and scatter it at a cell.
    fn write_beam(
        &mut self,
        elev_idx: usize,
        az_idx: usize,
        mut data: Vec<u8>,
        timing: BeamTiming,
    ) -> std::result::Result<(), DropReason> {
        let Some(cell) = self.geometry.cell(elev_idx, az_idx) else {
            return Err(DropReason::OutOfRange);
        };
        if self.mask.is_set(elev_idx, az_idx) && !self.config.use_repeated_elevations {
            return Err(DropReason::Duplicate);
        }
        let (Some(pipeline), Some(window)) = (self.pipeline.as_mut(), self.window.as_mut()) else {
            return Err(DropReason::OutOfRange);
        };

        self.mask.set(elev_idx, az_idx);
        window.record_beam(timing.time, timing.reference_time, timing.elevation);
        window.stats.beams_written += 1;

        let ctx = BeamContext {
            reference_time: timing.reference_time,
            volume_reference_time: window.reference_time.unwrap_or(timing.reference_time),
        };
        let cell_index = self.geometry.scan().cell_index(elev_idx, az_idx);
        let clutter = self
            .geometry
            .clutter()
            .map(|c| c.cell(cell_index))
            .unwrap_or(&[]);

        let buffer = pipeline.run(&ctx, &mut data, cell, clutter);
        for (point, values) in buffer.mapped() {
            if self.grids.scatter(point.offset as usize, values) {
                window.stats.points_scattered += 1;
            } else {
                window.stats.points_out_of_grid += 1;
            }
        }

        self.latest_time = Some(self.latest_time.map_or(timing.time, |t| t.max(timing.time)));
        Ok(())
    }

    /// Close the open volume and return its window. The grids stay
    /// readable until [`finish_volume`](Self::finish_volume).
    pub fn close_volume(&mut self) -> Result<VolumeWindow> {
        if self.state != EngineState::Accepting {
            return Err(self.state_error("accepting"));
        }
        self.state = EngineState::Closing;
        self.previous = None;

        let filter_stats = self.pipeline.as_ref().map(|p| p.stats()).unwrap_or_default();
        let window = self
            .window
            .as_mut()
            .ok_or_else(|| EngineError::State {
                expected: "open volume",
                actual: "no volume",
            })?;
        window.stats.merge_filter(filter_stats);

        info!(
            volume = window.volume_num,
            beams = window.beam_count,
            expected = window.expected_beams,
            interpolated = window.stats.beams_interpolated,
            duplicates = window.stats.dropped_duplicate,
            out_of_range = window.stats.dropped_out_of_range,
            "Closed volume"
        );
        Ok(window.clone())
    }

    /// Return to idle after the closed volume has been written.
    pub fn finish_volume(&mut self) {
        if self.state == EngineState::Closing {
            self.state = EngineState::Idle;
        }
    }

    /// The volume-local grid, available once a volume has been prepared.
    pub fn volume_snapshot(&self) -> Option<GridSnapshot<'_>> {
        self.snapshot(self.grids.volume())
    }

    /// The accumulation grid, available once a volume has been prepared.
    pub fn accum_snapshot(&self) -> Option<GridSnapshot<'_>> {
        self.snapshot(self.grids.accum())
    }

    fn snapshot<'a>(&'a self, grid: &'a FieldGrid) -> Option<GridSnapshot<'a>> {
        let prepared = self.prepared.as_ref()?;
        Some(GridSnapshot {
            geometry: &prepared.geometry,
            radar: &prepared.meta.radar,
            fields: &prepared.output_fields,
            grid,
            scan_type: prepared.meta.scan_type,
            volume_num: prepared.volume_num,
        })
    }

    fn state_error(&self, expected: &'static str) -> EngineError {
        EngineError::State {
            expected,
            actual: self.state.as_str(),
        }
    }
}

/// The single azimuth index skipped between `prev` and `current`, in
/// either rotation direction, with wraparound over `n` cells.
///
/// Adjacent cells never count as a gap, even when `n` is so small that
/// the long way round also skips exactly one cell.
pub fn skipped_index(prev: usize, current: usize, n: usize) -> Option<usize> {
    if n < 3 || prev >= n || current >= n {
        return None;
    }
    if (prev + 1) % n == current || (current + 1) % n == prev {
        return None;
    }
    if (prev + 2) % n == current {
        Some((prev + 1) % n)
    } else if (current + 2) % n == prev {
        Some((current + 1) % n)
    } else {
        None
    }
}

/// Byte-wise average of two payloads, rounding halves up.
pub fn average_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| ((x as u16 + y as u16 + 1) / 2) as u8)
        .collect()
}
