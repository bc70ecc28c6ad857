use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use super::config::SortConfig;
use super::error::{Result, SortError};
use super::merge::{MergeContext, merge_generations};
use super::order::SortOrder;
use super::output::{RecordEditor, TerminalSink};
use super::reduce::{PostSort, RecordReducer, SumFields};
use super::split::{RecordFilter, SplitOptions, SplitOutcome, split};
use crate::common::Encoding;

/// Entry point: holds the configuration and starts sort requests.
///
/// ```no_run
/// use extsort_rs::extsort::{SortEngine, SortOrder};
///
/// let summary = SortEngine::using(256)
///     .sort_in("unsorted.txt")
///     .sort(SortOrder::columns(0, 3))
///     .first()
///     .sort_out("sorted.txt")?;
/// println!("{} records written", summary.written);
/// # Ok::<(), extsort_rs::extsort::SortError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SortEngine {
    config: Arc<SortConfig>,
}

impl SortEngine {
    pub fn new(config: SortConfig) -> Self {
        SortEngine {
            config: Arc::new(config),
        }
    }

    /// `max_records` per in-memory batch; UTF-8; default workers.
    pub fn using(max_records: usize) -> Self {
        SortEngine::new(SortConfig::builder().with_max_records(max_records).build())
    }

    pub fn using_encoding(max_records: usize, encoding: Encoding) -> Self {
        SortEngine::new(
            SortConfig::builder()
                .with_max_records(max_records)
                .with_encoding(encoding)
                .build(),
        )
    }

    pub fn using_workers(max_records: usize, encoding: Encoding, workers: usize) -> Self {
        SortEngine::new(
            SortConfig::builder()
                .with_max_records(max_records)
                .with_encoding(encoding)
                .with_workers(workers)
                .build(),
        )
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Start a request on `source`.
    pub fn sort_in(&self, source: impl AsRef<Path>) -> SortRequest {
        SortRequest {
            config: Arc::clone(&self.config),
            source: source.as_ref().to_path_buf(),
            skip: 0,
            include: None,
            stop_after: None,
            in_rec: None,
            order: SortOrder::natural(),
            post_sort: None,
            out_rec: None,
        }
    }
}

/// Outcome of a successful sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Source records read, skipped ones included, end-of-data marker excluded.
    pub read: u64,
    /// Records that passed skip, filter and stop-after.
    pub accepted: u64,
    /// Records written to the destination.
    pub written: u64,
    /// Spill files produced by the split phase.
    pub spill_files: usize,
    /// Merge rounds, terminal merge included; 0 when everything fit in memory.
    pub merge_rounds: usize,
}

/// One sort of one source file into one destination.
///
/// Options may be set in any order; they always apply as skip, edit, filter,
/// stop-after on input, then sort, reduction and output edit.
pub struct SortRequest {
    config: Arc<SortConfig>,
    source: PathBuf,
    skip: u64,
    include: Option<RecordFilter>,
    stop_after: Option<u64>,
    in_rec: Option<RecordEditor>,
    order: SortOrder,
    post_sort: Option<PostSort>,
    out_rec: Option<RecordEditor>,
}

impl SortRequest {
    /// Drop the first `n` source records before anything else sees them.
    pub fn skip_record(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    /// Keep only records for which `test` holds. Runs after `in_rec`.
    pub fn include<F>(mut self, test: F) -> Self
    where
        F: FnMut(&str) -> bool + Send + 'static,
    {
        self.include = Some(Box::new(test));
        self
    }

    /// Stop reading once `n` records have been accepted.
    pub fn stop_after(mut self, n: u64) -> Self {
        self.stop_after = Some(n);
        self
    }

    /// Rewrite each source record before filtering and sorting.
    pub fn in_rec<F>(mut self, edit: F) -> Self
    where
        F: FnMut(String) -> String + Send + 'static,
    {
        self.in_rec = Some(Box::new(edit));
        self
    }

    /// Sort with `order` instead of natural order.
    pub fn sort(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Keep the first record of each group of equal keys.
    pub fn first(self) -> Self {
        self.post_sort(PostSort::First)
    }

    /// Keep the last record of each group of equal keys.
    pub fn last(self) -> Self {
        self.post_sort(PostSort::Last)
    }

    /// Keep only records whose key occurs more than once.
    pub fn all_dups(self) -> Self {
        self.post_sort(PostSort::AllDups)
    }

    /// Keep only records whose key occurs once.
    pub fn no_dups(self) -> Self {
        self.post_sort(PostSort::NoDups)
    }

    /// Keep the first record of each group whose key occurs more than once.
    pub fn first_dup(self) -> Self {
        self.post_sort(PostSort::FirstDup)
    }

    /// Keep the last record of each group whose key occurs more than once.
    pub fn last_dup(self) -> Self {
        self.post_sort(PostSort::LastDup)
    }

    /// Replace each group by the summary of `rule`.
    pub fn sum<S>(self, rule: S) -> Self
    where
        S: SumFields + Send + 'static,
    {
        self.post_sort(PostSort::Sum(Box::new(rule)))
    }

    /// Run a custom reducer over the sorted stream.
    pub fn reduce<R>(self, reducer: R) -> Self
    where
        R: RecordReducer + Send + 'static,
    {
        self.post_sort(PostSort::Reduce(Box::new(reducer)))
    }

    /// Select the reduction; replaces any earlier selection.
    pub fn post_sort(mut self, post_sort: PostSort) -> Self {
        self.post_sort = Some(post_sort);
        self
    }

    /// Rewrite each record just before it is written.
    pub fn out_rec<F>(mut self, edit: F) -> Self
    where
        F: FnMut(String) -> String + Send + 'static,
    {
        self.out_rec = Some(Box::new(edit));
        self
    }

    /// Run the sort, writing the result to `target`.
    ///
    /// On error the contents of `target` are unspecified.
    pub fn sort_out(self, target: impl AsRef<Path>) -> Result<SortSummary> {
        let target = target.as_ref().to_path_buf();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("extsort-merge-{}", i))
            .build()
            .map_err(SortError::WorkerPool)?;
        pool.install(move || self.execute(&target))
    }

    fn execute(self, target: &Path) -> Result<SortSummary> {
        let SortRequest {
            config,
            source,
            skip,
            include,
            stop_after,
            in_rec,
            order,
            post_sort,
            out_rec,
        } = self;
        let spill_dir = config.spill_dir();
        let opts = SplitOptions {
            skip,
            stop_after,
            in_rec,
            include,
        };

        let (outcome, counts) = split(
            &source,
            config.max_records,
            config.encoding,
            &spill_dir,
            &order,
            opts,
        )?;

        let reducer = post_sort.map(|p| p.into_reducer(&order));
        let mut summary = SortSummary {
            read: counts.read,
            accepted: counts.accepted,
            ..SortSummary::default()
        };

        // The destination is opened only after the source has been fully read.
        let mut sink = TerminalSink::create(target, config.encoding, reducer, out_rec)?;
        match outcome {
            SplitOutcome::InMemory(batch) => {
                debug!("single batch of {} records, no merge", batch.len());
                for record in batch {
                    sink.accept(record)?;
                }
            }
            SplitOutcome::Spilled(files) => {
                summary.spill_files = files.len();
                let ctx = MergeContext {
                    encoding: config.encoding,
                    spill_dir: &spill_dir,
                    order: &order,
                };
                summary.merge_rounds = merge_generations(files, &ctx, &mut sink)?;
            }
        }
        summary.written = sink.finish()?;
        Ok(summary)
    }
}
