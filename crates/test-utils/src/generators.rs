//! Synthetic beam generators.
//!
//! These produce predictable payloads so tests can check exactly which
//! bytes land where in the output grids.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use radar_common::{Beam, StreamMetadata, MISSING_BYTE};

/// Fixed start time used throughout the test suite.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .expect("valid fixture time")
}

/// Predictable non-missing byte for a beam position.
///
/// Values stay in `1..=250` so they never collide with the missing value.
pub fn pattern_value(elev_idx: usize, az_idx: usize, gate: usize, field: usize) -> u8 {
    (1 + (elev_idx * 97 + az_idx * 31 + gate * 7 + field * 3) % 250) as u8
}

/// Builder for a single beam.
#[derive(Debug, Clone)]
pub struct BeamBuilder {
    meta: Arc<StreamMetadata>,
    volume_num: i32,
    tilt_num: i32,
    elevation: f64,
    azimuth: f64,
    time: DateTime<Utc>,
    reference_time: Option<DateTime<Utc>>,
    data: Vec<u8>,
}

impl BeamBuilder {
    /// New beam with every gate missing.
    pub fn new(meta: &Arc<StreamMetadata>) -> Self {
        Self {
            meta: Arc::clone(meta),
            volume_num: 1,
            tilt_num: 0,
            elevation: 0.5,
            azimuth: 0.0,
            time: base_time(),
            reference_time: None,
            data: vec![MISSING_BYTE; meta.payload_len()],
        }
    }

    pub fn volume(mut self, volume_num: i32) -> Self {
        self.volume_num = volume_num;
        self
    }

    pub fn tilt(mut self, tilt_num: i32) -> Self {
        self.tilt_num = tilt_num;
        self
    }

    pub fn at(mut self, elevation: f64, azimuth: f64) -> Self {
        self.elevation = elevation;
        self.azimuth = azimuth;
        self
    }

    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Reference time; defaults to the beam time.
    pub fn reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = Some(time);
        self
    }

    /// Set every byte of every field.
    pub fn fill(mut self, value: u8) -> Self {
        self.data.iter_mut().for_each(|b| *b = value);
        self
    }

    /// Set one field across all gates.
    pub fn field(mut self, field: usize, values: &[u8]) -> Self {
        let nf = self.meta.num_fields();
        for (gate, &v) in values.iter().enumerate() {
            if let Some(b) = self.data.get_mut(gate * nf + field) {
                *b = v;
            }
        }
        self
    }

    pub fn gate(mut self, gate: usize, field: usize, value: u8) -> Self {
        let nf = self.meta.num_fields();
        if let Some(b) = self.data.get_mut(gate * nf + field) {
            *b = value;
        }
        self
    }

    /// Fill from a function of (gate, field).
    pub fn with(mut self, f: impl Fn(usize, usize) -> u8) -> Self {
        let nf = self.meta.num_fields();
        for (i, b) in self.data.iter_mut().enumerate() {
            *b = f(i / nf, i % nf);
        }
        self
    }

    pub fn build(self) -> Beam {
        Beam {
            volume_num: self.volume_num,
            tilt_num: self.tilt_num,
            elevation: self.elevation,
            azimuth: self.azimuth,
            time: self.time,
            reference_time: self.reference_time.unwrap_or(self.time),
            data: self.data,
            metadata: self.meta,
        }
    }
}

/// Beams covering one full volume, one per (elevation, azimuth) cell, in
/// scan order. Azimuths are cell centres of a regular scheme with
/// `num_azimuths` cells; payloads follow [`pattern_value`]. Beams are one
/// second apart starting at `start`.
pub fn volume_sweep(
    meta: &Arc<StreamMetadata>,
    elevations: &[f64],
    num_azimuths: usize,
    volume_num: i32,
    start: DateTime<Utc>,
) -> Vec<Beam> {
    let delta = 360.0 / num_azimuths as f64;
    let mut beams = Vec::with_capacity(elevations.len() * num_azimuths);
    for (e, &elev) in elevations.iter().enumerate() {
        for a in 0..num_azimuths {
            let n = beams.len() as i64;
            beams.push(
                BeamBuilder::new(meta)
                    .volume(volume_num)
                    .tilt(e as i32)
                    .at(elev, a as f64 * delta)
                    .time(start + Duration::seconds(n))
                    .reference_time(start)
                    .with(|gate, field| pattern_value(e, a, gate, field))
                    .build(),
            );
        }
    }
    beams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{dbz_field, stream_metadata, vel_field};

    #[test]
    fn test_builder_layout() {
        let meta = stream_metadata(vec![dbz_field(), vel_field()], 3, 1);
        let beam = BeamBuilder::new(&meta).field(1, &[5, 6, 7]).gate(0, 0, 9).build();
        assert_eq!(beam.data, vec![9, 5, 0, 6, 0, 7]);
        assert!(beam.validate().is_ok());
        assert_eq!(beam.reference_time, beam.time);
    }

    #[test]
    fn test_volume_sweep_covers_every_cell() {
        let meta = stream_metadata(vec![dbz_field()], 4, 1);
        let beams = volume_sweep(&meta, &[0.5, 1.5], 6, 3, base_time());
        assert_eq!(beams.len(), 12);
        assert_eq!(beams[7].azimuth, 60.0);
        assert_eq!(beams[7].elevation, 1.5);
        assert_eq!(beams[7].volume_num, 3);
        assert!(beams.iter().flat_map(|b| b.data.iter()).all(|&v| v != MISSING_BYTE));
    }
}
