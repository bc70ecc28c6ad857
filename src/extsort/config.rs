use std::path::{Path, PathBuf};

use crate::common::Encoding;

/// Records held in memory per batch when the caller does not choose.
pub const DEFAULT_MAX_RECORDS: usize = 2048;

/// Effective configuration of a sort engine. Immutable once a sort begins.
#[derive(Debug, Clone, PartialEq)]
pub struct SortConfig {
    /// Records sorted in memory before a batch is spilled to disk.
    pub max_records: usize,
    /// Encoding of the source, the spill files and the destination.
    pub encoding: Encoding,
    /// Size of the merge worker pool.
    pub workers: usize,
    /// Directory for spill files; `None` means the platform temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            max_records: DEFAULT_MAX_RECORDS,
            encoding: Encoding::Utf8,
            workers: default_workers(),
            temp_dir: None,
        }
    }
}

impl SortConfig {
    pub fn builder() -> SortConfigBuilder {
        SortConfigBuilder::default()
    }

    /// Directory where spill files are created.
    pub fn spill_dir(&self) -> PathBuf {
        match self.temp_dir {
            Some(ref dir) => dir.clone(),
            None => std::env::temp_dir(),
        }
    }
}

/// Half of the available parallel execution units, at least one.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).max(1)
}

/// Builder for [`SortConfig`]. Zero counts fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct SortConfigBuilder {
    max_records: usize,
    encoding: Option<Encoding>,
    workers: usize,
    temp_dir: Option<PathBuf>,
}

impl SortConfigBuilder {
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> SortConfig {
        SortConfig {
            max_records: if self.max_records > 0 {
                self.max_records
            } else {
                DEFAULT_MAX_RECORDS
            },
            encoding: self.encoding.unwrap_or_default(),
            workers: if self.workers > 0 {
                self.workers
            } else {
                default_workers()
            },
            temp_dir: self.temp_dir,
        }
    }
}
