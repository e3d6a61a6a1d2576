//! Polar scan geometry and precomputed gate-to-grid mappings.
//!
//! A [`LookupTable`] maps every (elevation, azimuth) cell of a scan to the
//! grid offsets its gates feed. A parallel [`ClutterTable`] carries a
//! reflectivity floor per mapped point. Both are keyed by scan type and
//! held by a [`GeometryTable`], which hot-swaps them when the scan
//! strategy changes and validates them against the live stream.
//!
//! # Architecture
//!
//! ```text
//! scan type ──► GeometryTable::update ──► TableStore::load_lookup / load_clutter
//!                      │
//! first beam ─► GeometryTable::check_geometry (position, altitude, range, clutter)
//!                      │
//! each beam ──► elevation_index (cached) ─► azimuth_index ─► LookupCell
//! ```

mod codec;
pub mod clutter;
pub mod error;
pub mod geometry;
pub mod lookup;
pub mod manager;
pub mod store;

pub use clutter::{ClutterPoint, ClutterTable};
pub use error::{GeometryError, TableError, TableResult};
pub use geometry::{AzimuthScheme, GeometryKind, GridParams, ScanGeometry, TableGeometry};
pub use lookup::{LookupCell, LookupHeader, LookupPoint, LookupTable};
pub use manager::{GeometryConfig, GeometryTable, GeometryTolerance, TableEntry};
pub use store::{FileTableStore, MemoryTableStore, TableStore};
