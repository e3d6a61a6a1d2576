//! Error types for table loading and geometry validation.

use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur while reading, writing or selecting tables.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("failed to read table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid table magic bytes (expected {expected})")]
    InvalidMagic { expected: &'static str },

    #[error("unsupported table version: {0}")]
    UnsupportedVersion(u32),

    #[error("table truncated at byte {0}")]
    Truncated(usize),

    #[error("table checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    Checksum { stored: u32, computed: u32 },

    #[error("invalid table contents: {0}")]
    Invalid(String),

    #[error("no lookup tables configured")]
    NoEntries,

    #[error("clutter removal enabled but no clutter table configured for scan type {0}")]
    MissingClutter(i32),
}

impl TableError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Mismatch between the loaded tables and the live beam stream.
///
/// All variants are scoped to the volume being prepared; the caller skips
/// that volume and tries again at the next one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error(
        "radar position differs from table {path}: distance {distance_km:.3} km exceeds {max_km:.3} km"
    )]
    SensorPosition {
        path: String,
        distance_km: f64,
        max_km: f64,
    },

    #[error(
        "radar altitude differs from table {path}: live {live_km:.4} km, table {table_km:.4} km (ratio {ratio:.5})"
    )]
    SensorAltitude {
        path: String,
        live_km: f64,
        table_km: f64,
        ratio: f64,
    },

    #[error("start range differs from table {path}: live {live_km:.4} km, table {table_km:.4} km")]
    StartRange {
        path: String,
        live_km: f64,
        table_km: f64,
    },

    #[error("gate spacing differs from table {path}: live {live_km:.4} km, table {table_km:.4} km")]
    GateSpacing {
        path: String,
        live_km: f64,
        table_km: f64,
    },

    #[error("clutter table {clutter_path} does not match lookup table {lookup_path}; regenerate the clutter table")]
    ClutterMismatch {
        lookup_path: String,
        clutter_path: String,
    },
}
