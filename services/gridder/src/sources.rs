//! Beam archive reader.
//!
//! An archive is a JSON-lines file. Each line is one record, tagged by
//! `type`:
//!
//! ```text
//! {"type":"metadata", "radar":{...}, "fields":[...], "scan_type":11}
//! {"type":"start_of_volume"}
//! {"type":"beam", "volume_num":3, "elevation":0.5, "azimuth":12.0,
//!  "time":"2024-06-01T12:00:00Z", "data":[...]}
//! {"type":"end_of_volume"}
//! ```
//!
//! Metadata records apply to every following beam until replaced. Blank
//! lines are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use radar_common::{Beam, StreamMetadata};
use resampler::{BeamSource, SourceError, SourceUnit};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiveRecord {
    Metadata(StreamMetadata),
    StartOfVolume,
    EndOfVolume,
    Beam(BeamRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamRecord {
    pub volume_num: i32,
    #[serde(default)]
    pub tilt_num: i32,
    pub elevation: f64,
    pub azimuth: f64,
    pub time: DateTime<Utc>,
    /// Defaults to `time`
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
    /// Gate-interleaved encoded bytes
    pub data: Vec<u8>,
    #[serde(default)]
    pub start_of_volume: bool,
    #[serde(default)]
    pub end_of_volume: bool,
}

/// Reads [`SourceUnit`]s from a JSON-lines beam archive.
pub struct ArchiveBeamSource<R> {
    reader: R,
    metadata: Option<Arc<StreamMetadata>>,
    line: String,
    record: usize,
}

impl ArchiveBeamSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened beam archive");
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> ArchiveBeamSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            metadata: None,
            line: String::new(),
            record: 0,
        }
    }

    fn decode_error(&self, message: impl Into<String>) -> SourceError {
        SourceError::Decode {
            record: self.record,
            message: message.into(),
        }
    }

    fn beam_unit(&self, rec: BeamRecord) -> Result<SourceUnit, SourceError> {
        let metadata = self
            .metadata
            .clone()
            .ok_or_else(|| self.decode_error("beam before any metadata record"))?;
        let beam = Beam {
            volume_num: rec.volume_num,
            tilt_num: rec.tilt_num,
            elevation: rec.elevation,
            azimuth: rec.azimuth,
            time: rec.time,
            reference_time: rec.reference_time.unwrap_or(rec.time),
            data: rec.data,
            metadata,
        };
        Ok(SourceUnit {
            beam: Some(beam),
            start_of_volume: rec.start_of_volume,
            end_of_volume: rec.end_of_volume,
        })
    }
}

impl<R: BufRead> BeamSource for ArchiveBeamSource<R> {
    fn next_unit(&mut self) -> Result<Option<SourceUnit>, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.record += 1;
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            let record: ArchiveRecord =
                serde_json::from_str(text).map_err(|e| self.decode_error(e.to_string()))?;
            match record {
                ArchiveRecord::Metadata(meta) => {
                    debug!(
                        scan_type = meta.scan_type,
                        fields = meta.num_fields(),
                        gates = meta.radar.num_gates,
                        "Stream metadata"
                    );
                    self.metadata = Some(Arc::new(meta));
                }
                ArchiveRecord::StartOfVolume => return Ok(Some(SourceUnit::start_of_volume())),
                ArchiveRecord::EndOfVolume => return Ok(Some(SourceUnit::end_of_volume())),
                ArchiveRecord::Beam(rec) => return self.beam_unit(rec).map(Some),
            }
        }
    }
}
