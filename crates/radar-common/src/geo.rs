//! Geodesy helpers.

/// Mean earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km between two lat/lon points (degrees),
/// using the haversine formula.
pub fn great_circle_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(great_circle_km(40.0, -105.0, 40.0, -105.0), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = great_circle_km(40.0, -105.0, 41.0, -105.0);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }
}
