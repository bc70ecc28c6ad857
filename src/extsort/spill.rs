use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::warn;
use tempfile::TempPath;

use super::error::{Result, SortError};
use crate::common::Encoding;
use crate::common::io::{RecordReader, RecordWriter};

const PREFIX: &str = "sort-";
const SUFFIX: &str = ".tmp";

/// A sorted run on disk, owned by exactly one producer or consumer at a time.
///
/// Dropping a `SpillFile` deletes it; [`SpillFile::discard`] does the same
/// but reports deletion failures.
pub(crate) struct SpillFile {
    path: TempPath,
    records: u64,
}

impl SpillFile {
    /// Write an already sorted batch to a fresh spill file in `dir`.
    pub(crate) fn write_batch(dir: &Path, encoding: Encoding, batch: &[String]) -> Result<Self> {
        let mut sink = SpillSink::create(dir, encoding)?;
        for record in batch {
            sink.write(record)?;
        }
        sink.finish()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn records(&self) -> u64 {
        self.records
    }

    pub(crate) fn open(&self, encoding: Encoding) -> Result<RecordReader<BufReader<File>>> {
        RecordReader::open_raw(&self.path, encoding).map_err(|e| SortError::ReadTemp {
            path: self.path.to_path_buf(),
            source: e,
        })
    }

    /// Delete a fully consumed spill file. Failure leaks the file but does
    /// not affect the sort result, so it is only logged.
    pub(crate) fn discard(self) {
        let shown = self.path.display().to_string();
        if let Err(e) = self.path.close() {
            warn!("error deleting temporary file {}: {}", shown, e);
        }
    }
}

/// Writer for a spill file under construction.
pub(crate) struct SpillSink {
    path: TempPath,
    writer: RecordWriter<File>,
    records: u64,
}

impl SpillSink {
    pub(crate) fn create(dir: &Path, encoding: Encoding) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| SortError::CreateTemp {
                dir: dir.to_path_buf(),
                source: e,
            })?;
        let (file, path) = file.into_parts();
        Ok(SpillSink {
            path,
            writer: RecordWriter::new(file, encoding),
            records: 0,
        })
    }

    pub(crate) fn write(&mut self, record: &str) -> Result<()> {
        self.writer
            .write_record(record)
            .map_err(|e| SortError::WriteTemp {
                path: self.path.to_path_buf(),
                source: e,
            })?;
        self.records += 1;
        Ok(())
    }

    /// Flush and close the file, turning it into a readable run.
    pub(crate) fn finish(self) -> Result<SpillFile> {
        let SpillSink {
            path,
            writer,
            records,
        } = self;
        match writer.finish() {
            Ok(file) => drop(file),
            Err(e) => {
                return Err(SortError::WriteTemp {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
        Ok(SpillFile { path, records })
    }
}
