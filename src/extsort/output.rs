use std::fs::File;
use std::path::{Path, PathBuf};

use super::error::{Result, SortError};
use super::reduce::RecordReducer;
use crate::common::Encoding;
use crate::common::io::RecordWriter;

/// Caller-supplied record rewrite, applied before the filter (`in_rec`) or
/// just before output (`out_rec`).
pub type RecordEditor = Box<dyn FnMut(String) -> String + Send>;

/// The destination end of the pipeline: reduction, then output edit, then
/// encoding. Both the terminal merge and the single-batch path write through
/// it, so reduction behaves the same whichever path a sort takes.
pub(crate) struct TerminalSink {
    path: PathBuf,
    writer: RecordWriter<File>,
    reducer: Option<Box<dyn RecordReducer + Send>>,
    out_rec: Option<RecordEditor>,
    written: u64,
}

impl TerminalSink {
    pub(crate) fn create(
        path: &Path,
        encoding: Encoding,
        reducer: Option<Box<dyn RecordReducer + Send>>,
        out_rec: Option<RecordEditor>,
    ) -> Result<Self> {
        let writer = RecordWriter::create(path, encoding).map_err(|e| SortError::WriteTarget {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(TerminalSink {
            path: path.to_path_buf(),
            writer,
            reducer,
            out_rec,
            written: 0,
        })
    }

    /// Feed the next record of the fully ordered stream.
    pub(crate) fn accept(&mut self, record: String) -> Result<()> {
        let emitted = match self.reducer {
            Some(ref mut reducer) => reducer.reduce(record),
            None => Some(record),
        };
        match emitted {
            Some(record) => self.emit(record),
            None => Ok(()),
        }
    }

    /// Flush the reducer, then the file. Returns the number of records written.
    pub(crate) fn finish(mut self) -> Result<u64> {
        let pending = self.reducer.as_mut().and_then(|r| r.flush());
        if let Some(record) = pending {
            self.emit(record)?;
        }
        let TerminalSink {
            path,
            writer,
            written,
            ..
        } = self;
        writer
            .finish()
            .map_err(|e| SortError::WriteTarget { path, source: e })?;
        Ok(written)
    }

    fn emit(&mut self, record: String) -> Result<()> {
        let record = match self.out_rec {
            Some(ref mut edit) => edit(record),
            None => record,
        };
        self.writer
            .write_record(&record)
            .map_err(|e| SortError::WriteTarget {
                path: self.path.clone(),
                source: e,
            })?;
        self.written += 1;
        Ok(())
    }
}
