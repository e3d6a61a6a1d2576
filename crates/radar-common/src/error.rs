//! Error types for shared radar types.

use thiserror::Error;

/// Result type alias using RadarError.
pub type RadarResult<T> = Result<T, RadarError>;

#[derive(Debug, Error)]
pub enum RadarError {
    #[error("Field not found in input stream: {0}")]
    FieldNotFound(String),

    #[error("Beam payload has {actual} bytes, expected {expected} ({gates} gates x {fields} fields)")]
    PayloadSize {
        expected: usize,
        actual: usize,
        gates: usize,
        fields: usize,
    },

    #[error("Invalid field encoding for '{field}': scale must be non-zero")]
    ZeroScale { field: String },
}
