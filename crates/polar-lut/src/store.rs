//! Backing stores for lookup and clutter tables.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::clutter::ClutterTable;
use crate::error::{TableError, TableResult};
use crate::lookup::LookupTable;

/// Source of table images, keyed by path.
pub trait TableStore: Send {
    fn load_lookup(&self, path: &Path) -> TableResult<LookupTable>;
    fn load_clutter(&self, path: &Path) -> TableResult<ClutterTable>;
}

/// Reads tables from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileTableStore {
    /// Optional directory that relative table paths resolve against
    base_dir: Option<PathBuf>,
}

impl FileTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn open(&self, path: &Path) -> TableResult<BufReader<File>> {
        let resolved = self.resolve(path);
        debug!(path = %resolved.display(), "Opening table file");
        File::open(&resolved)
            .map(BufReader::new)
            .map_err(|source| TableError::Read {
                path: resolved.display().to_string(),
                source,
            })
    }
}

impl TableStore for FileTableStore {
    fn load_lookup(&self, path: &Path) -> TableResult<LookupTable> {
        LookupTable::load(self.open(path)?)
    }

    fn load_clutter(&self, path: &Path) -> TableResult<ClutterTable> {
        ClutterTable::load(self.open(path)?)
    }
}

/// In-memory table images, for tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    images: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_lookup(&mut self, path: impl Into<PathBuf>, table: &LookupTable) -> TableResult<()> {
        let mut image = Vec::new();
        table.save(&mut image)?;
        self.images.insert(path.into(), image);
        Ok(())
    }

    pub fn insert_clutter(&mut self, path: impl Into<PathBuf>, table: &ClutterTable) -> TableResult<()> {
        let mut image = Vec::new();
        table.save(&mut image)?;
        self.images.insert(path.into(), image);
        Ok(())
    }

    fn image(&self, path: &Path) -> TableResult<&[u8]> {
        self.images
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| TableError::Read {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such table"),
            })
    }
}

impl TableStore for MemoryTableStore {
    fn load_lookup(&self, path: &Path) -> TableResult<LookupTable> {
        LookupTable::load(self.image(path)?)
    }

    fn load_clutter(&self, path: &Path) -> TableResult<ClutterTable> {
        ClutterTable::load(self.image(path)?)
    }
}
