//! Configuration for the resampling engine and output writer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the resampling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Name of the reflectivity field used for clutter suppression.
    pub dbz_field: String,

    /// Noise despiking along each beam.
    pub despike: DespikeConfig,

    /// Drop gathered points whose quality field does not exceed the
    /// per-gate noise threshold.
    pub threshold_points: bool,

    /// Allow a later beam to overwrite a cell already written this volume.
    pub use_repeated_elevations: bool,

    /// Which input fields appear in the output grids.
    pub output_fields: OutputFields,

    /// Field carrying time relative to each beam's reference time.
    pub time_field: Option<TimeFieldConfig>,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            dbz_field: "DBZ".to_string(),
            despike: DespikeConfig::default(),
            threshold_points: false,
            use_repeated_elevations: false,
            output_fields: OutputFields::All,
            time_field: None,
        }
    }
}

impl ResampleConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.dbz_field.trim().is_empty() {
            return Err("dbz_field must not be empty".to_string());
        }

        if let OutputFields::List(names) = &self.output_fields {
            if names.is_empty() {
                return Err("output_fields list must not be empty".to_string());
            }
        }

        if let Some(time) = &self.time_field {
            if time.name.trim().is_empty() {
                return Err("time_field.name must not be empty".to_string());
            }
        }

        if self.despike.enabled || self.threshold_points {
            self.despike.validate()?;
        }

        Ok(())
    }

    /// True if a per-gate noise threshold table is needed.
    pub fn needs_noise_table(&self) -> bool {
        self.despike.enabled || self.threshold_points
    }
}

/// Noise despiking and per-gate threshold parameters.
///
/// The threshold at range `r` is
/// `noise_dbz_at_ref + 20 log10(r / ref_range_km) + snr_margin_db`,
/// encoded with the quality field's scale and bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DespikeConfig {
    pub enabled: bool,
    /// Runs of above-threshold gates shorter than this are zeroed.
    pub min_run: usize,
    /// Field compared against the noise threshold.
    pub quality_field: String,
    pub snr_margin_db: f64,
    /// Noise level at `ref_range_km`.
    pub noise_dbz_at_ref: f64,
    pub ref_range_km: f64,
}

impl Default for DespikeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_run: 5,
            quality_field: "DBZ".to_string(),
            snr_margin_db: 3.0,
            noise_dbz_at_ref: 0.0,
            ref_range_km: 100.0,
        }
    }
}

impl DespikeConfig {
    fn validate(&self) -> Result<(), String> {
        if self.quality_field.trim().is_empty() {
            return Err("despike.quality_field must not be empty".to_string());
        }
        if self.enabled && self.min_run == 0 {
            return Err("despike.min_run must be > 0".to_string());
        }
        if self.ref_range_km <= 0.0 {
            return Err("despike.ref_range_km must be > 0".to_string());
        }
        Ok(())
    }
}

/// Output field selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFields {
    /// Every input field, in input order.
    All,
    /// Named fields, in this order.
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFieldConfig {
    pub name: String,
    /// Append the time field to the output if not already selected.
    #[serde(default)]
    pub include: bool,
}

/// Configuration for output grid writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for complete-volume grids (`<dir>/<YYYYMMDD>/<HHMMSS>.rgrd`).
    pub output_dir: PathBuf,

    /// Directory for the overwritten intermediate grid.
    pub latest_dir: PathBuf,

    /// Deflate-compress field data.
    pub compress: bool,

    /// Volumes spanning longer than this are rejected.
    pub max_volume_duration_secs: f64,

    pub check_missing_beams: bool,
    pub max_missing_beams: usize,

    pub intermediate: IntermediateConfig,

    pub centroid: CentroidMode,

    pub dataset: DatasetInfo,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data/gridded"),
            latest_dir: PathBuf::from("./data/gridded/latest"),
            compress: true,
            max_volume_duration_secs: 900.0,
            check_missing_beams: false,
            max_missing_beams: 0,
            intermediate: IntermediateConfig::default(),
            centroid: CentroidMode::Midpoint,
            dataset: DatasetInfo::default(),
        }
    }
}

impl OutputConfig {
    /// Apply environment overrides for the output locations.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("GRIDDER_OUTPUT_DIR") {
            if !val.is_empty() {
                self.output_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("GRIDDER_LATEST_DIR") {
            if !val.is_empty() {
                self.latest_dir = PathBuf::from(val);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir must not be empty".to_string());
        }

        if self.intermediate.enabled {
            if self.latest_dir.as_os_str().is_empty() {
                return Err("latest_dir must not be empty when intermediate writes are enabled".to_string());
            }
            if self.intermediate.interval_secs == 0 {
                return Err("intermediate.interval_secs must be > 0".to_string());
            }
        }

        if self.max_volume_duration_secs <= 0.0 {
            return Err("max_volume_duration_secs must be > 0".to_string());
        }

        if let CentroidMode::EndMinusAge { age_secs } = self.centroid {
            if age_secs < 0.0 {
                return Err("centroid.age_secs must be >= 0".to_string());
            }
        }

        Ok(())
    }
}

/// Wall-clock cadence for intermediate writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntermediateConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for IntermediateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
        }
    }
}

/// How the centroid time of a complete volume is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidMode {
    /// Halfway between the first and last beam.
    Midpoint,
    /// Fixed age before the last beam.
    EndMinusAge { age_secs: f64 },
}

/// Free-text dataset description written into every grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetInfo {
    pub name: String,
    pub info: String,
    pub source: String,
}
