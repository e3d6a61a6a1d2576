//! Radar and stream parameters carried alongside each beam.

use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};
use crate::field::FieldParams;

/// Radar/sensor parameter block as reported by the beam stream.
///
/// Written verbatim into every output grid as an auxiliary record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarParams {
    pub radar_id: i32,
    pub radar_name: String,
    /// Sensor latitude (degrees)
    pub latitude: f64,
    /// Sensor longitude (degrees)
    pub longitude: f64,
    /// Sensor altitude (km MSL)
    pub altitude_km: f64,
    pub num_gates: usize,
    pub gate_spacing_km: f64,
    pub start_range_km: f64,
    #[serde(default = "default_beam_width")]
    pub beam_width_deg: f64,
    #[serde(default)]
    pub pulse_width_us: f64,
    #[serde(default)]
    pub prf_hz: f64,
    #[serde(default)]
    pub wavelength_cm: f64,
    #[serde(default)]
    pub samples_per_beam: u32,
}

fn default_beam_width() -> f64 {
    1.0
}

impl RadarParams {
    /// Range to the center of a gate, in km.
    #[inline]
    pub fn gate_range_km(&self, gate: usize) -> f64 {
        self.start_range_km + gate as f64 * self.gate_spacing_km
    }
}

/// Radar parameters plus field encodings for the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub radar: RadarParams,
    pub fields: Vec<FieldParams>,
    /// Scan strategy identifier selecting the lookup table
    pub scan_type: i32,
}

impl StreamMetadata {
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Position of a field by (case-insensitive) name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.is_named(name))
    }

    /// Like [`field_index`](Self::field_index) but errors if absent.
    pub fn require_field(&self, name: &str) -> RadarResult<usize> {
        self.field_index(name)
            .ok_or_else(|| RadarError::FieldNotFound(name.to_string()))
    }

    /// Expected beam payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.radar.num_gates * self.fields.len()
    }
}
