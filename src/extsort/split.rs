use std::path::Path;

use log::debug;
use rayon::prelude::*;

use super::error::{Result, SortError};
use super::order::SortOrder;
use super::output::RecordEditor;
use super::spill::SpillFile;
use crate::common::Encoding;
use crate::common::io::RecordReader;

/// Source line that marks end of data.
const END_OF_DATA: &str = "\u{1a}";

/// Batches above this size are sorted on the worker pool.
const PARALLEL_SORT_THRESHOLD: usize = 10_000;

/// Record inclusion test, run on the edited record.
pub type RecordFilter = Box<dyn FnMut(&str) -> bool + Send>;

/// Input-side options of a request, consumed by the split phase.
pub(crate) struct SplitOptions {
    pub(crate) skip: u64,
    pub(crate) stop_after: Option<u64>,
    pub(crate) in_rec: Option<RecordEditor>,
    pub(crate) include: Option<RecordFilter>,
}

/// Where the accepted records ended up.
pub(crate) enum SplitOutcome {
    /// Everything fit in one batch: sorted, still in memory.
    InMemory(Vec<String>),
    /// Sorted runs on disk, in source order.
    Spilled(Vec<SpillFile>),
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SplitCounts {
    pub(crate) read: u64,
    pub(crate) accepted: u64,
}

/// Accumulates accepted records and spills full batches.
struct Splitter<'a> {
    max_records: usize,
    encoding: Encoding,
    spill_dir: &'a Path,
    order: &'a SortOrder,
    batch: Vec<String>,
    spills: Vec<SpillFile>,
}

impl<'a> Splitter<'a> {
    /// Spilling happens when a record arrives and the batch is already full,
    /// so a source of exactly `max_records` records never reaches disk.
    fn push(&mut self, record: String) -> Result<()> {
        if self.batch.len() >= self.max_records {
            self.spill()?;
        }
        self.batch.push(record);
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        sort_batch(&mut self.batch, self.order);
        let spill = SpillFile::write_batch(self.spill_dir, self.encoding, &self.batch)?;
        debug!(
            "spilled {} records to {}",
            self.batch.len(),
            spill.path().display()
        );
        self.spills.push(spill);
        self.batch.clear();
        Ok(())
    }

    fn finish(mut self) -> Result<SplitOutcome> {
        if self.spills.is_empty() {
            sort_batch(&mut self.batch, self.order);
            return Ok(SplitOutcome::InMemory(self.batch));
        }
        if !self.batch.is_empty() {
            self.spill()?;
        }
        Ok(SplitOutcome::Spilled(self.spills))
    }
}

/// Stable batch sort; large batches go through rayon's parallel merge sort.
fn sort_batch(batch: &mut [String], order: &SortOrder) {
    let cmp = |a: &String, b: &String| order.compare(a, b);
    if batch.len() > PARALLEL_SORT_THRESHOLD {
        batch.par_sort_by(cmp);
    } else {
        batch.sort_by(cmp);
    }
}

/// Read `source` once, applying skip, edit, filter and stop-after, and sort
/// the accepted records into batches.
pub(crate) fn split(
    source: &Path,
    max_records: usize,
    encoding: Encoding,
    spill_dir: &Path,
    order: &SortOrder,
    mut opts: SplitOptions,
) -> Result<(SplitOutcome, SplitCounts)> {
    let read_err = |e: std::io::Error| SortError::ReadSource {
        path: source.to_path_buf(),
        source: e,
    };
    let mut reader = RecordReader::open(source, encoding).map_err(read_err)?;
    let mut splitter = Splitter {
        max_records,
        encoding,
        spill_dir,
        order,
        batch: Vec::with_capacity(max_records.min(64 * 1024)),
        spills: Vec::new(),
    };
    let stop_after = opts.stop_after.unwrap_or(u64::MAX);
    let mut counts = SplitCounts::default();

    while counts.accepted < stop_after {
        let Some(line) = reader.next_record().map_err(read_err)? else {
            break;
        };
        if line == END_OF_DATA {
            break;
        }
        counts.read += 1;
        if counts.read <= opts.skip {
            continue;
        }
        let record = match opts.in_rec {
            Some(ref mut edit) => edit(line),
            None => line,
        };
        if let Some(ref mut include) = opts.include {
            if !include(&record) {
                continue;
            }
        }
        counts.accepted += 1;
        splitter.push(record)?;
    }

    debug!(
        "split {}: {} read, {} accepted, {} spill files",
        source.display(),
        counts.read,
        counts.accepted,
        splitter.spills.len()
    );
    Ok((splitter.finish()?, counts))
}
