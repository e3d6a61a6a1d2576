//! Common types shared by the radar gridding crates.
//!
//! Beams arrive as byte-encoded gate samples, gate-interleaved across
//! fields (`data[gate * n_fields + field]`). Physical values are recovered
//! with the per-field scale and bias carried in [`FieldParams`].

pub mod beam;
pub mod error;
pub mod field;
pub mod geo;
pub mod radar;
pub mod time;

pub use beam::Beam;
pub use error::{RadarError, RadarResult};
pub use field::{FieldParams, MISSING_BYTE};
pub use geo::great_circle_km;
pub use radar::{RadarParams, StreamMetadata};
pub use time::{centroid_path, seconds_between};
