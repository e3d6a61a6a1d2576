//! Time helpers for volume bookkeeping and output paths.

use chrono::{DateTime, Utc};

/// Signed seconds from `start` to `end`, with sub-second precision.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

/// Storage path for an output keyed by centroid time: `YYYYMMDD/HHMMSS`.
pub fn centroid_path(centroid: DateTime<Utc>) -> String {
    centroid.format("%Y%m%d/%H%M%S").to_string()
}
