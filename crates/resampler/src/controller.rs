//! Driving loop: pulls units from a beam source, opens and closes volumes,
//! and triggers complete and intermediate writes.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use radar_common::Beam;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{BeamOutcome, EngineState, ResampleEngine};
use crate::error::{Result, SourceError};
use crate::output::VolumeOutputWriter;

/// One unit read from the transport.
#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    pub beam: Option<Beam>,
    pub start_of_volume: bool,
    pub end_of_volume: bool,
}

impl SourceUnit {
    pub fn beam(beam: Beam) -> Self {
        Self {
            beam: Some(beam),
            ..Default::default()
        }
    }

    pub fn start_of_volume() -> Self {
        Self {
            start_of_volume: true,
            ..Default::default()
        }
    }

    pub fn end_of_volume() -> Self {
        Self {
            end_of_volume: true,
            ..Default::default()
        }
    }
}

/// Blocking source of beams and volume boundaries.
pub trait BeamSource {
    /// Next unit, or `None` at end of stream. Errors are fatal.
    fn next_unit(&mut self) -> std::result::Result<Option<SourceUnit>, SourceError>;
}

/// In-memory source, mainly for tests and replays.
#[derive(Debug, Default)]
pub struct MemoryBeamSource {
    units: VecDeque<SourceUnit>,
}

impl MemoryBeamSource {
    pub fn new(units: impl IntoIterator<Item = SourceUnit>) -> Self {
        Self {
            units: units.into_iter().collect(),
        }
    }

    pub fn push(&mut self, unit: SourceUnit) {
        self.units.push_back(unit);
    }
}

impl BeamSource for MemoryBeamSource {
    fn next_unit(&mut self) -> std::result::Result<Option<SourceUnit>, SourceError> {
        Ok(self.units.pop_front())
    }
}

/// Wall clock used for intermediate-write cadence and generation times.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Totals for one controller run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units: usize,
    pub beams: usize,
    pub beams_written: usize,
    pub beams_skipped: usize,
    pub volumes_written: usize,
    pub volumes_rejected: usize,
    pub volumes_skipped: usize,
    pub write_failures: usize,
    pub intermediate_writes: usize,
}

pub struct VolumeController<S, C = SystemClock> {
    engine: ResampleEngine,
    writer: VolumeOutputWriter,
    source: S,
    clock: C,
    last_intermediate: DateTime<Utc>,
    /// Volume number being accepted or skipped
    current_volume: Option<i32>,
    summary: RunSummary,
}

impl<S: BeamSource, C: Clock> VolumeController<S, C> {
    pub fn new(engine: ResampleEngine, writer: VolumeOutputWriter, source: S, clock: C) -> Self {
        let last_intermediate = clock.now();
        Self {
            engine,
            writer,
            source,
            clock,
            last_intermediate,
            current_volume: None,
            summary: RunSummary::default(),
        }
    }

    pub fn engine(&self) -> &ResampleEngine {
        &self.engine
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Process units until the source is exhausted. The open volume, if
    /// any, is closed and written at end of stream.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<RunSummary> {
        info!("Starting volume controller");
        while let Some(unit) = self.source.next_unit()? {
            self.summary.units += 1;
            self.handle_unit(unit)?;
        }
        self.end_volume()?;

        info!(
            units = self.summary.units,
            beams = self.summary.beams,
            volumes_written = self.summary.volumes_written,
            volumes_rejected = self.summary.volumes_rejected,
            volumes_skipped = self.summary.volumes_skipped,
            intermediate_writes = self.summary.intermediate_writes,
            "Beam source exhausted"
        );
        Ok(self.summary)
    }

    /// Handle one unit: start flag, then beam, then end flag.
    pub fn handle_unit(&mut self, unit: SourceUnit) -> Result<()> {
        if unit.start_of_volume {
            debug!("Start of volume");
            self.end_volume()?;
        }

        if let Some(beam) = unit.beam {
            self.summary.beams += 1;
            self.handle_beam(beam)?;
            self.maybe_write_intermediate();
        }

        if unit.end_of_volume {
            debug!("End of volume");
            self.end_volume()?;
        }
        Ok(())
    }

    fn handle_beam(&mut self, beam: Beam) -> Result<()> {
        if self.current_volume != Some(beam.volume_num) {
            if self.current_volume.is_some() {
                debug!(
                    previous = self.current_volume,
                    next = beam.volume_num,
                    "Volume number changed"
                );
            }
            self.end_volume()?;
            self.start_volume(&beam)?;
        }

        if self.engine.state() != EngineState::Accepting {
            self.summary.beams_skipped += 1;
            return Ok(());
        }

        if let BeamOutcome::Written { interpolated } = self.engine.process_beam(beam)? {
            self.summary.beams_written += 1 + usize::from(interpolated);
        }
        Ok(())
    }

    /// Swap tables and prepare the engine from a volume's first beam.
    /// Geometry mismatches skip the volume; anything else is fatal.
    fn start_volume(&mut self, beam: &Beam) -> Result<()> {
        self.current_volume = Some(beam.volume_num);
        let scan_type = beam.metadata.scan_type;

        if self.engine.update_geometry(scan_type)? {
            info!(
                scan_type,
                path = %self.engine.geometry().lookup_path().display(),
                "Switched lookup tables"
            );
        }

        match self.engine.prepare_volume(&beam.metadata, beam.volume_num) {
            Ok(()) => Ok(()),
            Err(e) if e.is_volume_scoped() => {
                warn!(
                    volume = beam.volume_num,
                    scan_type,
                    error = %e,
                    "Skipping volume"
                );
                self.summary.volumes_skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the open volume and write it.
    fn end_volume(&mut self) -> Result<()> {
        self.current_volume = None;
        if self.engine.state() != EngineState::Accepting {
            return Ok(());
        }

        let window = self.engine.close_volume()?;
        let now = self.clock.now();
        if let Some(snapshot) = self.engine.volume_snapshot() {
            match self.writer.write_complete(&window, snapshot, now) {
                Ok(_) => self.summary.volumes_written += 1,
                Err(e) if e.is_rejection() => {
                    warn!(
                        volume = window.volume_num,
                        beams = window.beam_count,
                        duration_secs = window.duration_secs(),
                        error = %e,
                        "Volume rejected"
                    );
                    self.summary.volumes_rejected += 1;
                }
                Err(e) => {
                    error!(volume = window.volume_num, error = %e, "Failed to write volume");
                    self.summary.write_failures += 1;
                }
            }
        }
        self.engine.finish_volume();
        Ok(())
    }

    /// Write the accumulation grid if the wall-clock interval has elapsed.
    fn maybe_write_intermediate(&mut self) {
        let cfg = &self.writer.config().intermediate;
        if !cfg.enabled {
            return;
        }
        let interval = Duration::seconds(cfg.interval_secs as i64);
        let now = self.clock.now();
        if now - self.last_intermediate < interval {
            return;
        }
        let (Some(latest), Some(snapshot)) =
            (self.engine.latest_data_time(), self.engine.accum_snapshot())
        else {
            return;
        };

        self.last_intermediate = now;
        match self.writer.write_intermediate(latest, interval, snapshot, now) {
            Ok(_) => self.summary.intermediate_writes += 1,
            Err(e) => {
                error!(error = %e, "Failed to write intermediate grid");
                self.summary.write_failures += 1;
            }
        }
    }
}
