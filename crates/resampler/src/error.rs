//! Error types for the resampling engine, output writer and beam source.

use polar_lut::{GeometryError, TableError};
use thiserror::Error;

/// Errors raised while preparing volumes or processing beams.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A configured output field is not in the input stream.
    #[error("output field {0} not found in input stream")]
    MissingField(String),

    /// The configured time field is not in the input stream.
    #[error("time field {0} not found in input stream")]
    MissingTimeField(String),

    /// Live stream does not match the loaded tables.
    #[error("geometry check failed: {0}")]
    Geometry(#[from] GeometryError),

    /// Table could not be loaded or swapped.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Operation called in the wrong engine state.
    #[error("engine is {actual}, expected {expected}")]
    State {
        expected: &'static str,
        actual: &'static str,
    },

    /// Beam source failed.
    #[error("beam source error: {0}")]
    Source(#[from] SourceError),
}

impl EngineError {
    /// True if the failure only affects the current volume; the controller
    /// skips that volume and resumes at the next one.
    pub fn is_volume_scoped(&self) -> bool {
        matches!(self, Self::Geometry(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while writing output grids.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("volume duration {duration_secs:.1}s exceeds maximum {max_secs:.1}s")]
    DurationExceeded { duration_secs: f64, max_secs: f64 },

    #[error("volume missing {missing} of {expected} beams (maximum {max_missing})")]
    TooManyMissingBeams {
        missing: usize,
        expected: usize,
        max_missing: usize,
    },

    #[error("no data to write: {0}")]
    NoData(String),

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode grid header: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid grid file: {0}")]
    Format(String),
}

impl WriteError {
    /// True for validation rejections: the volume is dropped and processing
    /// continues.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::DurationExceeded { .. } | Self::TooManyMissingBeams { .. } | Self::NoData(_)
        )
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors from the beam transport. Always fatal.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read beam source: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to decode beam at record {record}: {message}")]
    Decode { record: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let geom = EngineError::Geometry(GeometryError::StartRange {
            path: "a.lut".into(),
            live_km: 0.5,
            table_km: 0.0,
        });
        assert!(geom.is_volume_scoped());
        assert!(!EngineError::MissingTimeField("TIME".into()).is_volume_scoped());
        assert!(!EngineError::Table(TableError::NoEntries).is_volume_scoped());

        assert!(WriteError::NoData("empty".into()).is_rejection());
        let io = WriteError::io(
            std::path::Path::new("/out"),
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(!io.is_rejection());
        assert!(io.to_string().contains("/out"));
    }
}
