//! Per-beam filter pipeline.
//!
//! Every beam passes through the same fixed sequence of stages:
//!
//! ```text
//! raw gates ─► Despike ─► Gather ─► TimeCorrection ─► ClutterSuppression ─► points
//! ```
//!
//! Despike edits the beam's gate bytes in place. Gather copies the output
//! fields of every lookup point into a [`PointBuffer`]; the later stages
//! edit that buffer. Disabled stages are left out of the pipeline, but the
//! relative order never changes.

use chrono::{DateTime, Utc};
use polar_lut::{ClutterPoint, LookupCell, LookupPoint};
use radar_common::{seconds_between, FieldParams, RadarParams, MISSING_BYTE};

use crate::config::DespikeConfig;

/// Closest range used when evaluating the noise curve (km).
const MIN_NOISE_RANGE_KM: f64 = 0.001;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Despike,
    Gather,
    TimeCorrection,
    ClutterSuppression,
}

impl FilterStage {
    pub const ORDER: [FilterStage; 4] = [
        FilterStage::Despike,
        FilterStage::Gather,
        FilterStage::TimeCorrection,
        FilterStage::ClutterSuppression,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Despike => "despike",
            Self::Gather => "gather",
            Self::TimeCorrection => "time_correction",
            Self::ClutterSuppression => "clutter_suppression",
        }
    }
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Noise threshold
// ============================================================================

/// Encoded noise threshold per gate for the quality field.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseTable {
    thresholds: Vec<u8>,
}

impl NoiseTable {
    /// Threshold at range `r`:
    /// `noise_dbz_at_ref + 20 log10(r / ref_range_km) + snr_margin_db`,
    /// encoded with the quality field's scale and bias.
    pub fn compute(
        params: &DespikeConfig,
        radar: &RadarParams,
        num_gates: usize,
        quality: &FieldParams,
    ) -> Self {
        let thresholds = (0..num_gates)
            .map(|gate| {
                let range = radar.gate_range_km(gate).max(MIN_NOISE_RANGE_KM);
                let noise = params.noise_dbz_at_ref + 20.0 * (range / params.ref_range_km).log10();
                encode_threshold(noise + params.snr_margin_db, quality)
            })
            .collect();
        Self { thresholds }
    }

    pub fn from_thresholds(thresholds: Vec<u8>) -> Self {
        Self { thresholds }
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn threshold(&self, gate: usize) -> Option<u8> {
        self.thresholds.get(gate).copied()
    }

    /// True if `value` is strictly above the threshold at `gate`. Gates
    /// beyond the table never pass.
    #[inline]
    pub fn exceeds(&self, gate: usize, value: u8) -> bool {
        self.thresholds.get(gate).is_some_and(|&t| value > t)
    }
}

fn encode_threshold(value: f64, field: &FieldParams) -> u8 {
    if field.scale == 0.0 || !value.is_finite() {
        return u8::MAX;
    }
    ((value - field.bias) / field.scale).round().clamp(0.0, 255.0) as u8
}

/// Zero every field of short above-threshold runs along a beam.
///
/// A run is a stretch of consecutive gates whose quality byte exceeds the
/// noise threshold. When gate `i` breaks a run, the run ending at `i - 1`
/// is zeroed if it is shorter than `min_run`. A run still open at the last
/// gate is left alone. Returns the number of gates zeroed.
pub fn despike(
    data: &mut [u8],
    num_fields: usize,
    quality_field: usize,
    noise: &NoiseTable,
    min_run: usize,
) -> usize {
    if num_fields == 0 || quality_field >= num_fields {
        return 0;
    }
    let num_gates = data.len() / num_fields;
    let mut run = 0usize;
    let mut zeroed = 0usize;

    for gate in 0..num_gates {
        if noise.exceeds(gate, data[gate * num_fields + quality_field]) {
            run += 1;
            continue;
        }
        if run > 0 && run < min_run {
            data[(gate - run) * num_fields..gate * num_fields].fill(MISSING_BYTE);
            zeroed += run;
        }
        run = 0;
    }
    zeroed
}

// ============================================================================
// Point buffer
// ============================================================================

/// Gathered values for the points of one lookup cell.
#[derive(Debug, Clone, Default)]
pub struct PointBuffer {
    num_fields: usize,
    /// Lookup point per slot; `None` for polar padding
    points: Vec<Option<LookupPoint>>,
    values: Vec<u8>,
    valid: Vec<bool>,
}

impl PointBuffer {
    pub fn with_capacity(max_points: usize, num_fields: usize) -> Self {
        Self {
            num_fields,
            points: Vec::with_capacity(max_points),
            values: Vec::with_capacity(max_points * num_fields),
            valid: Vec::with_capacity(max_points),
        }
    }

    fn reset(&mut self, len: usize) {
        self.points.clear();
        self.points.resize(len, None);
        self.values.clear();
        self.values.resize(len * self.num_fields, MISSING_BYTE);
        self.valid.clear();
        self.valid.resize(len, false);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn point(&self, k: usize) -> Option<LookupPoint> {
        self.points.get(k).copied().flatten()
    }

    /// Output field values at slot `k`.
    pub fn values(&self, k: usize) -> &[u8] {
        let n = self.num_fields;
        self.values.get(k * n..(k + 1) * n).unwrap_or(&[])
    }

    /// True if slot `k` carries gathered data.
    pub fn is_valid(&self, k: usize) -> bool {
        self.valid.get(k).copied().unwrap_or(false)
    }

    /// Mapped points with their values, skipping padding.
    pub fn mapped(&self) -> impl Iterator<Item = (LookupPoint, &[u8])> + '_ {
        (0..self.len()).filter_map(move |k| self.point(k).map(|p| (p, self.values(k))))
    }

    fn invalidate(&mut self, k: usize) {
        let n = self.num_fields;
        if let Some(v) = self.values.get_mut(k * n..(k + 1) * n) {
            v.fill(MISSING_BYTE);
        }
        if let Some(flag) = self.valid.get_mut(k) {
            *flag = false;
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Times needed by the time-correction stage.
#[derive(Debug, Clone, Copy)]
pub struct BeamContext {
    pub reference_time: DateTime<Utc>,
    pub volume_reference_time: DateTime<Utc>,
}

/// Time-carrying output field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCorrection {
    /// Position among the output fields
    pub output_position: usize,
    /// Seconds per encoded unit
    pub scale_secs: f64,
}

/// Quality field and its noise table.
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub field: usize,
    pub noise: NoiseTable,
}

/// Everything the pipeline needs for one volume.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub num_input_fields: usize,
    /// Input field index for each output field
    pub input_indices: Vec<usize>,
    pub max_points: usize,
    pub quality: Option<QualityGate>,
    /// Minimum run length; `None` disables despiking
    pub despike_min_run: Option<usize>,
    pub threshold_points: bool,
    pub time_correction: Option<TimeCorrection>,
    /// Input index of reflectivity; `None` disables clutter suppression
    pub clutter_dbz_field: Option<usize>,
}

/// Per-volume filter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub gates_despiked: usize,
    pub points_thresholded: usize,
    pub points_time_corrected: usize,
    pub points_clutter_suppressed: usize,
}

/// Ordered per-beam filters with a reusable point buffer.
#[derive(Debug, Clone)]
pub struct BeamFilterPipeline {
    stages: Vec<FilterStage>,
    options: PipelineOptions,
    buffer: PointBuffer,
    stats: FilterStats,
}

impl BeamFilterPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        let despike_on = options.despike_min_run.is_some() && options.quality.is_some();
        let stages = FilterStage::ORDER
            .into_iter()
            .filter(|stage| match stage {
                FilterStage::Despike => despike_on,
                FilterStage::Gather => true,
                FilterStage::TimeCorrection => options.time_correction.is_some(),
                FilterStage::ClutterSuppression => options.clutter_dbz_field.is_some(),
            })
            .collect();
        let buffer = PointBuffer::with_capacity(options.max_points, options.input_indices.len());
        Self {
            stages,
            options,
            buffer,
            stats: FilterStats::default(),
        }
    }

    /// Active stages in execution order.
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    pub fn buffer(&self) -> &PointBuffer {
        &self.buffer
    }

    /// Run every stage on one beam. `data` is the beam payload and may be
    /// modified; `clutter` lists the clutter points of this cell.
    pub fn run(
        &mut self,
        ctx: &BeamContext,
        data: &mut [u8],
        cell: &LookupCell,
        clutter: &[ClutterPoint],
    ) -> &PointBuffer {
        for i in 0..self.stages.len() {
            match self.stages[i] {
                FilterStage::Despike => self.despike(data),
                FilterStage::Gather => self.gather(data, cell),
                FilterStage::TimeCorrection => self.correct_time(ctx),
                FilterStage::ClutterSuppression => self.suppress_clutter(data, clutter),
            }
        }
        &self.buffer
    }

    fn despike(&mut self, data: &mut [u8]) {
        let (Some(quality), Some(min_run)) = (&self.options.quality, self.options.despike_min_run)
        else {
            return;
        };
        self.stats.gates_despiked += despike(
            data,
            self.options.num_input_fields,
            quality.field,
            &quality.noise,
            min_run,
        );
    }

    fn gather(&mut self, data: &[u8], cell: &LookupCell) {
        let nf = self.options.num_input_fields;
        let n_out = self.options.input_indices.len();
        self.buffer.reset(cell.num_points());
        if nf == 0 {
            return;
        }
        let num_gates = data.len() / nf;
        let threshold = self
            .options
            .quality
            .as_ref()
            .filter(|_| self.options.threshold_points);

        for k in 0..cell.num_points() {
            let Some(point) = cell.point(k) else {
                continue;
            };
            self.buffer.points[k] = Some(point);

            let gate = point.gate as usize;
            if gate >= num_gates {
                continue;
            }
            let src = &data[gate * nf..(gate + 1) * nf];
            if let Some(q) = threshold {
                if !q.noise.exceeds(gate, src[q.field]) {
                    self.stats.points_thresholded += 1;
                    continue;
                }
            }
            let dst = &mut self.buffer.values[k * n_out..(k + 1) * n_out];
            for (value, &idx) in dst.iter_mut().zip(&self.options.input_indices) {
                *value = src.get(idx).copied().unwrap_or(MISSING_BYTE);
            }
            self.buffer.valid[k] = true;
        }
    }

    fn correct_time(&mut self, ctx: &BeamContext) {
        let Some(tc) = self.options.time_correction else {
            return;
        };
        if tc.scale_secs == 0.0 {
            return;
        }
        let diff = seconds_between(ctx.reference_time, ctx.volume_reference_time);
        let delta = (diff / tc.scale_secs).round() as i64;
        if delta == 0 {
            return;
        }
        let n_out = self.buffer.num_fields;
        for k in 0..self.buffer.len() {
            if !self.buffer.valid[k] {
                continue;
            }
            let byte = &mut self.buffer.values[k * n_out + tc.output_position];
            // encoded overflow wraps
            *byte = (*byte as i64 - delta).rem_euclid(256) as u8;
            self.stats.points_time_corrected += 1;
        }
    }

    fn suppress_clutter(&mut self, data: &[u8], clutter: &[ClutterPoint]) {
        let Some(dbz_field) = self.options.clutter_dbz_field else {
            return;
        };
        let nf = self.options.num_input_fields;
        for cp in clutter {
            let k = cp.point_index as usize;
            if !self.buffer.is_valid(k) {
                continue;
            }
            let Some(point) = self.buffer.point(k) else {
                continue;
            };
            let Some(&dbz) = data.get(point.gate as usize * nf + dbz_field) else {
                continue;
            };
            if dbz <= cp.floor {
                self.buffer.invalidate(k);
                self.stats.points_clutter_suppressed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noise(thresholds: &[u8]) -> NoiseTable {
        NoiseTable::from_thresholds(thresholds.to_vec())
    }

    fn polar_cell(n: u32) -> LookupCell {
        LookupCell::Polar {
            base_offset: 0,
            num_points: n,
            last_data_gate: n - 1,
        }
    }

    fn ctx(offset_secs: i64) -> BeamContext {
        let volume = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        BeamContext {
            reference_time: volume + Duration::seconds(offset_secs),
            volume_reference_time: volume,
        }
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let pipeline = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 2,
            input_indices: vec![0, 1],
            quality: Some(QualityGate {
                field: 0,
                noise: noise(&[10; 4]),
            }),
            despike_min_run: Some(2),
            time_correction: Some(TimeCorrection {
                output_position: 1,
                scale_secs: 1.0,
            }),
            clutter_dbz_field: Some(0),
            ..Default::default()
        });
        assert_eq!(pipeline.stages(), &FilterStage::ORDER);

        let minimal = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 1,
            input_indices: vec![0],
            despike_min_run: Some(2),
            ..Default::default()
        });
        // despike needs a quality field
        assert_eq!(minimal.stages(), &[FilterStage::Gather]);
    }

    #[test]
    fn test_noise_table_curve() {
        let radar = RadarParams {
            radar_id: 1,
            radar_name: "T".into(),
            latitude: 0.0,
            longitude: 0.0,
            altitude_km: 0.0,
            num_gates: 3,
            gate_spacing_km: 100.0,
            start_range_km: 0.0,
            beam_width_deg: 1.0,
            pulse_width_us: 0.0,
            prf_hz: 0.0,
            wavelength_cm: 0.0,
            samples_per_beam: 0,
        };
        let params = DespikeConfig {
            enabled: true,
            min_run: 3,
            quality_field: "DBZ".into(),
            snr_margin_db: 3.0,
            noise_dbz_at_ref: 0.0,
            ref_range_km: 100.0,
        };
        let dbz = FieldParams::new("DBZ", "dBZ", 0.5, -32.0);
        let table = NoiseTable::compute(&params, &radar, 3, &dbz);
        // 100 km: 0 + 0 + 3 = 3 dBZ -> 70; 200 km: +6.02 dB -> 9.02 dBZ -> 82
        assert_eq!(table.threshold(1), Some(70));
        assert_eq!(table.threshold(2), Some(82));
        // gate 0 clamps to 1 m: far below the bias
        assert_eq!(table.threshold(0), Some(0));
        assert!(table.exceeds(1, 71));
        assert!(!table.exceeds(1, 70));
        assert!(!table.exceeds(5, 255));
    }

    #[test]
    fn test_despike_short_run_zeroed() {
        // two fields, quality is field 0, threshold 10 everywhere
        let nt = noise(&[10; 8]);
        #[rustfmt::skip]
        let mut data = vec![
            5, 1,   // below
            20, 2,  // run of 2
            30, 3,
            5, 4,   // breaks the run
            20, 5,  // run of 3
            20, 6,
            20, 7,
            5, 8,
        ];
        let zeroed = despike(&mut data, 2, 0, &nt, 3);
        assert_eq!(zeroed, 2);
        assert_eq!(&data[2..6], &[0, 0, 0, 0]);
        assert_eq!(&data[8..14], &[20, 5, 20, 6, 20, 7]);

        // second pass changes nothing
        let before = data.clone();
        assert_eq!(despike(&mut data, 2, 0, &nt, 3), 0);
        assert_eq!(data, before);
    }

    #[test]
    fn test_despike_run_at_end_not_flushed() {
        let nt = noise(&[10; 4]);
        let mut data = vec![5, 5, 20, 20];
        assert_eq!(despike(&mut data, 1, 0, &nt, 3), 0);
        assert_eq!(data, vec![5, 5, 20, 20]);
    }

    #[test]
    fn test_gather_threshold_drops_all_fields() {
        let mut pipeline = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 2,
            input_indices: vec![1, 0],
            max_points: 3,
            quality: Some(QualityGate {
                field: 0,
                noise: noise(&[10, 10, 10]),
            }),
            threshold_points: true,
            ..Default::default()
        });
        let mut data = vec![20, 1, 5, 2, 30, 3];
        let buf = pipeline.run(&ctx(0), &mut data, &polar_cell(3), &[]);
        assert_eq!(buf.values(0), &[1, 20]);
        assert!(!buf.is_valid(1));
        assert_eq!(buf.values(1), &[0, 0]);
        assert_eq!(buf.values(2), &[3, 30]);
        assert_eq!(pipeline.stats().points_thresholded, 1);
    }

    #[test]
    fn test_gather_skips_polar_padding_and_short_beams() {
        let mut pipeline = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 1,
            input_indices: vec![0],
            ..Default::default()
        });
        let cell = LookupCell::Polar {
            base_offset: 10,
            num_points: 5,
            last_data_gate: 2,
        };
        // beam has only two gates
        let mut data = vec![7, 8];
        let buf = pipeline.run(&ctx(0), &mut data, &cell, &[]);
        assert_eq!(buf.len(), 5);
        assert!(buf.is_valid(1));
        // gate 2 is mapped but beyond the beam
        assert!(buf.point(2).is_some());
        assert!(!buf.is_valid(2));
        // gates 3-4 are padding
        assert!(buf.point(3).is_none());
        assert_eq!(buf.mapped().count(), 3);
    }

    #[test]
    fn test_time_correction_wraps() {
        let mut pipeline = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 2,
            input_indices: vec![0, 1],
            time_correction: Some(TimeCorrection {
                output_position: 1,
                scale_secs: 1.0,
            }),
            ..Default::default()
        });
        // beam reference 10 s after the volume reference: times shift up
        let mut data = vec![1, 100, 1, 250];
        let buf = pipeline.run(&ctx(10), &mut data, &polar_cell(2), &[]);
        assert_eq!(buf.values(0), &[1, 110]);
        assert_eq!(buf.values(1), &[1, 4]);

        // earlier beam reference shifts down
        let mut data = vec![1, 100, 1, 3];
        let buf = pipeline.run(&ctx(-10), &mut data, &polar_cell(2), &[]);
        assert_eq!(buf.values(0), &[1, 90]);
        assert_eq!(buf.values(1), &[1, 249]);
    }

    #[test]
    fn test_clutter_suppression_at_or_below_floor() {
        let mut pipeline = BeamFilterPipeline::new(PipelineOptions {
            num_input_fields: 2,
            input_indices: vec![0, 1],
            clutter_dbz_field: Some(0),
            ..Default::default()
        });
        let clutter = [
            ClutterPoint {
                point_index: 0,
                floor: 50,
            },
            ClutterPoint {
                point_index: 1,
                floor: 50,
            },
            ClutterPoint {
                point_index: 9,
                floor: 50,
            },
        ];
        let mut data = vec![50, 7, 51, 8, 10, 9];
        let buf = pipeline.run(&ctx(0), &mut data, &polar_cell(3), &clutter);
        assert_eq!(buf.values(0), &[0, 0]);
        assert_eq!(buf.values(1), &[51, 8]);
        // no clutter entry for point 2
        assert_eq!(buf.values(2), &[10, 9]);
        assert_eq!(pipeline.stats().points_clutter_suppressed, 1);
    }
}
