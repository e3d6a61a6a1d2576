//! A single radar beam.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{RadarError, RadarResult};
use crate::radar::StreamMetadata;

/// One polar measurement: gate samples for every field at a single
/// elevation/azimuth.
///
/// `data` is gate-interleaved: `data[gate * n_fields + field]`.
#[derive(Debug, Clone)]
pub struct Beam {
    pub volume_num: i32,
    pub tilt_num: i32,
    /// Elevation angle (degrees)
    pub elevation: f64,
    /// Azimuth angle (degrees, clockwise from north)
    pub azimuth: f64,
    /// Time the beam was measured
    pub time: DateTime<Utc>,
    /// Reference time for fields encoding a relative time
    pub reference_time: DateTime<Utc>,
    pub data: Vec<u8>,
    pub metadata: Arc<StreamMetadata>,
}

impl Beam {
    pub fn num_fields(&self) -> usize {
        self.metadata.num_fields()
    }

    /// Number of gates actually present in the payload.
    pub fn num_gates(&self) -> usize {
        match self.metadata.num_fields() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    /// Encoded byte for a gate/field pair, if in range.
    #[inline]
    pub fn value(&self, gate: usize, field: usize) -> Option<u8> {
        let nf = self.num_fields();
        if field >= nf {
            return None;
        }
        self.data.get(gate * nf + field).copied()
    }

    /// Check the payload length against the stream metadata.
    pub fn validate(&self) -> RadarResult<()> {
        let expected = self.metadata.payload_len();
        if self.data.len() != expected {
            return Err(RadarError::PayloadSize {
                expected,
                actual: self.data.len(),
                gates: self.metadata.radar.num_gates,
                fields: self.metadata.num_fields(),
            });
        }
        Ok(())
    }
}
