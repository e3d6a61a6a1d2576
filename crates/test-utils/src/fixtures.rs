//! Common test fixtures for radar gridding tests.
//!
//! A single synthetic radar at a fixed site, a handful of field
//! encodings, and small scan geometries that keep grids tiny enough to
//! inspect point by point.

use std::sync::Arc;

use polar_lut::{AzimuthScheme, GeometryKind, GridParams, LookupTable, ScanGeometry};
use radar_common::{FieldParams, RadarParams, StreamMetadata};

/// Test radar site.
pub const RADAR_LAT: f64 = 40.0;
pub const RADAR_LON: f64 = -105.0;
pub const RADAR_ALT_KM: f64 = 1.6;

/// Gate spacing used by every fixture geometry (km).
pub const GATE_SPACING_KM: f64 = 1.0;

pub fn radar_params(num_gates: usize) -> RadarParams {
    RadarParams {
        radar_id: 7,
        radar_name: "TEST".to_string(),
        latitude: RADAR_LAT,
        longitude: RADAR_LON,
        altitude_km: RADAR_ALT_KM,
        num_gates,
        gate_spacing_km: GATE_SPACING_KM,
        start_range_km: 0.0,
        beam_width_deg: 1.0,
        pulse_width_us: 1.0,
        prf_hz: 1000.0,
        wavelength_cm: 10.7,
        samples_per_beam: 64,
    }
}

/// Reflectivity: 0.5 dB steps from -32 dBZ.
pub fn dbz_field() -> FieldParams {
    FieldParams::new("DBZ", "dBZ", 0.5, -32.0)
}

pub fn vel_field() -> FieldParams {
    FieldParams::new("VEL", "m/s", 0.5, -64.0)
}

pub fn snr_field() -> FieldParams {
    FieldParams::new("SNR", "dB", 0.5, -10.0)
}

/// Relative time in whole seconds.
pub fn time_field() -> FieldParams {
    FieldParams::new("TIME", "s", 1.0, 0.0)
}

pub fn stream_metadata(fields: Vec<FieldParams>, num_gates: usize, scan_type: i32) -> Arc<StreamMetadata> {
    Arc::new(StreamMetadata {
        radar: radar_params(num_gates),
        fields,
        scan_type,
    })
}

/// Polar scan whose azimuth cell `i` is centred on `i * 360 / num_azimuths`.
pub fn polar_scan(elevations: &[f64], num_azimuths: usize, num_gates: usize) -> ScanGeometry {
    let delta = 360.0 / num_azimuths as f64;
    ScanGeometry {
        kind: GeometryKind::Polar,
        elevations: elevations.to_vec(),
        azimuths: AzimuthScheme::Regular {
            num_azimuths,
            delta_az: delta,
            az_offset: delta / 2.0,
        },
        start_range_km: 0.0,
        gate_spacing_km: GATE_SPACING_KM,
        num_gates,
    }
}

/// Polar (identity) lookup table for the test radar site.
pub fn polar_lookup(scan_type: i32, scan: ScanGeometry) -> LookupTable {
    LookupTable::polar(scan_type, (RADAR_LAT, RADAR_LON, RADAR_ALT_KM), scan)
        .expect("fixture polar table")
}

/// Square flat plane centred on the radar.
pub fn ppi_plane(n: usize, dxy_km: f64) -> GridParams {
    let half = (n.saturating_sub(1)) as f64 * dxy_km / 2.0;
    GridParams {
        nx: n,
        ny: n,
        nz: 1,
        dx: dxy_km,
        dy: dxy_km,
        dz: 1.0,
        minx: -half,
        miny: -half,
        minz: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polar_scan_centres_map_to_own_index() {
        let scan = polar_scan(&[0.5], 8, 4);
        for i in 0..8 {
            assert_eq!(scan.azimuth_index(0, i as f64 * 45.0), Some(i));
        }
    }

    #[test]
    fn test_polar_lookup_size() {
        let table = polar_lookup(1, polar_scan(&[0.5, 1.5], 4, 3));
        assert_eq!(table.grid().points_per_volume(), 2 * 4 * 3);
    }
}
