//! Balanced pairwise merge of spill files.
//!
//! Each round pairs the current generation in order (file 2k with 2k+1), merges
//! every pair on the worker pool and waits for the whole round before pairing
//! the next generation. An odd trailing file is carried over unmerged. When two
//! files remain they are merged straight into the destination.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use rayon::prelude::*;

use super::error::{Result, SortError};
use super::order::SortOrder;
use super::output::TerminalSink;
use super::spill::{SpillFile, SpillSink};
use crate::common::Encoding;
use crate::common::io::RecordReader;

/// Read-only state shared by every merge task.
pub(crate) struct MergeContext<'a> {
    pub(crate) encoding: Encoding,
    pub(crate) spill_dir: &'a Path,
    pub(crate) order: &'a SortOrder,
}

/// Merge `generation` down to the destination. Must run inside the worker
/// pool. Returns the number of merge rounds, terminal merge included.
pub(crate) fn merge_generations(
    mut generation: Vec<SpillFile>,
    ctx: &MergeContext<'_>,
    sink: &mut TerminalSink,
) -> Result<usize> {
    let mut rounds = 0;
    while generation.len() > 2 {
        rounds += 1;
        debug!(
            "merge round {}: {} files on {} workers",
            rounds,
            generation.len(),
            rayon::current_num_threads()
        );
        generation = merge_round(generation, ctx)?;
    }

    let mut files = generation.into_iter();
    if let Some(left) = files.next() {
        rounds += 1;
        let right = files.next();
        debug!(
            "terminal merge: {} + {} records",
            left.records(),
            right.as_ref().map_or(0, |r| r.records())
        );
        merge_terminal(left, right, ctx, sink)?;
    }
    Ok(rounds)
}

enum MergeTask {
    Pair(SpillFile, SpillFile),
    Carry(SpillFile),
}

/// One generation: all pair merges run in parallel; the collect returns only
/// after every task has finished, which is the round barrier.
fn merge_round(generation: Vec<SpillFile>, ctx: &MergeContext<'_>) -> Result<Vec<SpillFile>> {
    let mut tasks = Vec::with_capacity(generation.len() / 2 + 1);
    let mut files = generation.into_iter();
    while let Some(left) = files.next() {
        match files.next() {
            Some(right) => tasks.push(MergeTask::Pair(left, right)),
            None => tasks.push(MergeTask::Carry(left)),
        }
    }

    tasks
        .into_par_iter()
        .map(|task| match task {
            MergeTask::Pair(left, right) => merge_pair(left, right, ctx),
            MergeTask::Carry(file) => Ok(file),
        })
        .collect()
}

/// Intermediate merge into a new spill file; both inputs are deleted after.
fn merge_pair(left: SpillFile, right: SpillFile, ctx: &MergeContext<'_>) -> Result<SpillFile> {
    let mut out = SpillSink::create(ctx.spill_dir, ctx.encoding)?;
    merge_two(&left, Some(&right), ctx, |record| out.write(&record))?;
    let merged = out.finish()?;
    left.discard();
    right.discard();
    Ok(merged)
}

/// The last merge: records flow through the reducer and output edit into the
/// destination. `right` is `None` only for a one-file generation.
fn merge_terminal(
    left: SpillFile,
    right: Option<SpillFile>,
    ctx: &MergeContext<'_>,
    sink: &mut TerminalSink,
) -> Result<()> {
    merge_two(&left, right.as_ref(), ctx, |record| sink.accept(record))?;
    left.discard();
    if let Some(right) = right {
        right.discard();
    }
    Ok(())
}

/// Cursor over one merge input holding its current record.
struct MergeInput {
    reader: RecordReader<BufReader<File>>,
    path: PathBuf,
    head: Option<String>,
}

impl MergeInput {
    fn open(spill: &SpillFile, encoding: Encoding) -> Result<Self> {
        let mut input = MergeInput {
            reader: spill.open(encoding)?,
            path: spill.path().to_path_buf(),
            head: None,
        };
        input.advance()?;
        Ok(input)
    }

    fn advance(&mut self) -> Result<()> {
        self.head = self
            .reader
            .next_record()
            .map_err(|e| SortError::ReadTemp {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(())
    }

    /// Hand out the current record and move to the next one.
    fn take(&mut self) -> Result<Option<String>> {
        let record = self.head.take();
        if record.is_some() {
            self.advance()?;
        }
        Ok(record)
    }
}

/// Two-way merge. Ties go to `left`: earlier files in pairing order hold
/// records that came earlier in the source, so this keeps the sort stable.
fn merge_two<F>(
    left: &SpillFile,
    right: Option<&SpillFile>,
    ctx: &MergeContext<'_>,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(String) -> Result<()>,
{
    let mut lhs = MergeInput::open(left, ctx.encoding)?;
    let mut rhs = match right {
        Some(spill) => Some(MergeInput::open(spill, ctx.encoding)?),
        None => None,
    };

    loop {
        let right_head = rhs.as_ref().and_then(|r| r.head.as_deref());
        let take_left = match (lhs.head.as_deref(), right_head) {
            (None, None) => break,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => ctx.order.compare(a, b) != Ordering::Greater,
        };
        let next = if take_left {
            lhs.take()?
        } else {
            match rhs {
                Some(ref mut input) => input.take()?,
                None => None,
            }
        };
        if let Some(record) = next {
            emit(record)?;
        }
    }
    Ok(())
}
