//! Beam-to-grid resampling with volume-local and continuous accumulation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   SourceUnit   ┌──────────────────┐
//! │  BeamSource  │ ─────────────► │ VolumeController │
//! └──────────────┘                └────────┬─────────┘
//!                                          │ update_geometry / prepare_volume
//!                                          │ process_beam / close_volume
//!                                          ▼
//!                   ┌───────────────────────────────────────────┐
//!                   │              ResampleEngine               │
//!                   │  GeometryTable ─► BeamFilterPipeline ─►   │
//!                   │  scatter into VolumeGrids {volume, accum} │
//!                   └──────────────────────┬────────────────────┘
//!                                          │ GridSnapshot
//!                                          ▼
//!                               ┌────────────────────┐
//!                               │ VolumeOutputWriter │ ─► GridSink
//!                               └────────────────────┘
//! ```
//!
//! Complete volumes are written at volume close from the volume grid;
//! intermediate snapshots are written on a wall-clock cadence from the
//! accumulation grid. Everything runs on the caller's thread.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod filter;
pub mod grid;
pub mod output;
pub mod tables;

pub use config::{
    CentroidMode, DatasetInfo, DespikeConfig, IntermediateConfig, OutputConfig, OutputFields,
    ResampleConfig, TimeFieldConfig,
};
pub use controller::{
    BeamSource, Clock, MemoryBeamSource, RunSummary, SourceUnit, SystemClock, VolumeController,
};
pub use engine::{
    BeamOutcome, DropReason, EngineState, GridSnapshot, ResampleEngine, VolumeStats, VolumeWindow,
};
pub use error::{EngineError, Result, SourceError, WriteError};
pub use filter::{BeamFilterPipeline, FilterStage, FilterStats, NoiseTable};
pub use grid::{BeamWrittenMask, FieldGrid, GridDims, VolumeGrids};
pub use output::{
    read_grid, FileGridSink, GridHeader, GridSink, LatestDataInfo, OutputGrid, VolumeOutputWriter,
};
pub use tables::{field_code, UNKNOWN_FIELD_CODE};
