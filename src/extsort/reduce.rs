//! Group reduction over the fully merged record stream.
//!
//! A group is a run of adjacent records that compare equal under the active
//! [`SortOrder`]. Every operator sees each record of the terminal stream once,
//! in order, and is flushed exactly once at the end. State is bounded by the
//! previous record (or the group's first record) plus a flag.

use super::order::SortOrder;

/// Single-pass reduction over a key-ordered stream.
pub trait RecordReducer {
    /// Consume the next record; return a record to emit, if any.
    fn reduce(&mut self, record: String) -> Option<String>;

    /// Release whatever is still pending after the last record.
    fn flush(&mut self) -> Option<String>;
}

/// Fold rule for [`Sum`]: reset at group start, add every record, summarize
/// once the group closes.
pub trait SumFields {
    fn reset(&mut self);

    fn add(&mut self, record: &str);

    /// Output record for the closed group, given its first record.
    fn summary(&self, first: &str) -> String;
}

/// Which reduction a request applies to the terminal stream.
pub enum PostSort {
    First,
    Last,
    AllDups,
    NoDups,
    FirstDup,
    LastDup,
    Sum(Box<dyn SumFields + Send>),
    Reduce(Box<dyn RecordReducer + Send>),
}

impl PostSort {
    /// Bind the selection to the ordering that defines groups.
    pub(crate) fn into_reducer(self, order: &SortOrder) -> Box<dyn RecordReducer + Send> {
        let order = order.clone();
        match self {
            PostSort::First => Box::new(First { order, first: None }),
            PostSort::Last => Box::new(Last {
                order,
                pending: None,
            }),
            PostSort::AllDups => Box::new(AllDups {
                order,
                pending: None,
                in_dup: false,
            }),
            PostSort::NoDups => Box::new(NoDups {
                order,
                pending: None,
                single: false,
            }),
            PostSort::FirstDup => Box::new(FirstDup {
                order,
                prev: None,
                emitted: false,
            }),
            PostSort::LastDup => Box::new(LastDup {
                order,
                pending: None,
                dup: false,
            }),
            PostSort::Sum(rule) => Box::new(Sum {
                order,
                rule,
                first: None,
            }),
            PostSort::Reduce(custom) => custom,
        }
    }
}

impl std::fmt::Debug for PostSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PostSort::First => "First",
            PostSort::Last => "Last",
            PostSort::AllDups => "AllDups",
            PostSort::NoDups => "NoDups",
            PostSort::FirstDup => "FirstDup",
            PostSort::LastDup => "LastDup",
            PostSort::Sum(_) => "Sum",
            PostSort::Reduce(_) => "Reduce",
        };
        f.write_str(name)
    }
}

/// First record of each group. Only the record opening a group is kept, so
/// a clone happens once per group.
struct First {
    order: SortOrder,
    first: Option<String>,
}

impl RecordReducer for First {
    fn reduce(&mut self, record: String) -> Option<String> {
        if let Some(ref first) = self.first {
            if self.order.same_group(first, &record) {
                return None;
            }
        }
        self.first = Some(record.clone());
        Some(record)
    }

    fn flush(&mut self) -> Option<String> {
        None
    }
}

/// Last record of each group, emitted when the next group starts.
struct Last {
    order: SortOrder,
    pending: Option<String>,
}

impl RecordReducer for Last {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.pending.take() {
            Some(prev) if !self.order.same_group(&prev, &record) => Some(prev),
            _ => None,
        };
        self.pending = Some(record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        self.pending.take()
    }
}

/// Every record of groups with two or more members.
struct AllDups {
    order: SortOrder,
    pending: Option<String>,
    in_dup: bool,
}

impl RecordReducer for AllDups {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.pending.take() {
            Some(prev) if self.order.same_group(&prev, &record) => {
                self.in_dup = true;
                Some(prev)
            }
            Some(prev) => {
                // group closed: its last member is a dup only if the group had company
                let out = self.in_dup.then_some(prev);
                self.in_dup = false;
                out
            }
            None => None,
        };
        self.pending = Some(record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        let out = self.pending.take().filter(|_| self.in_dup);
        self.in_dup = false;
        out
    }
}

/// The record of each singleton group.
struct NoDups {
    order: SortOrder,
    pending: Option<String>,
    single: bool,
}

impl RecordReducer for NoDups {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.pending.take() {
            Some(prev) if self.order.same_group(&prev, &record) => {
                self.single = false;
                None
            }
            Some(prev) => {
                let out = self.single.then_some(prev);
                self.single = true;
                out
            }
            None => {
                self.single = true;
                None
            }
        };
        self.pending = Some(record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        let out = self.pending.take().filter(|_| self.single);
        self.single = false;
        out
    }
}

/// First record of each group with two or more members.
struct FirstDup {
    order: SortOrder,
    prev: Option<String>,
    emitted: bool,
}

impl RecordReducer for FirstDup {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.prev.take() {
            Some(prev) if self.order.same_group(&prev, &record) => {
                if self.emitted {
                    None
                } else {
                    self.emitted = true;
                    Some(prev)
                }
            }
            _ => {
                self.emitted = false;
                None
            }
        };
        self.prev = Some(record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        None
    }
}

/// Last record of each group with two or more members.
struct LastDup {
    order: SortOrder,
    pending: Option<String>,
    dup: bool,
}

impl RecordReducer for LastDup {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.pending.take() {
            Some(prev) if self.order.same_group(&prev, &record) => {
                self.dup = true;
                None
            }
            Some(prev) => {
                let out = self.dup.then_some(prev);
                self.dup = false;
                out
            }
            None => None,
        };
        self.pending = Some(record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        let out = self.pending.take().filter(|_| self.dup);
        self.dup = false;
        out
    }
}

/// Fold each group through a [`SumFields`] rule. The summary of a group is
/// known only once the next group's first record (or the flush) arrives.
struct Sum {
    order: SortOrder,
    rule: Box<dyn SumFields + Send>,
    first: Option<String>,
}

impl RecordReducer for Sum {
    fn reduce(&mut self, record: String) -> Option<String> {
        let out = match self.first.take() {
            Some(first) if self.order.same_group(&first, &record) => {
                self.first = Some(first);
                None
            }
            closed => {
                let summary = closed.map(|first| self.rule.summary(&first));
                self.rule.reset();
                self.first = Some(record.clone());
                summary
            }
        };
        self.rule.add(&record);
        out
    }

    fn flush(&mut self) -> Option<String> {
        self.first.take().map(|first| self.rule.summary(&first))
    }
}

/// Rule whose summary is the group's first record: `sum(NoSummary)` behaves
/// like `first`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSummary;

impl SumFields for NoSummary {
    fn reset(&mut self) {}

    fn add(&mut self, _record: &str) {}

    fn summary(&self, first: &str) -> String {
        first.to_owned()
    }
}

/// Group count: the key columns of the group's first record followed by the
/// number of records in the group, zero-padded to `width` digits.
///
/// With key `(0, 3)` and width 3, the group `001001`, `001002` becomes
/// `001002`. With several key ranges their columns are concatenated in order.
#[derive(Debug, Clone)]
pub struct GroupCount {
    keys: Vec<(usize, usize)>,
    width: usize,
    count: u64,
}

impl GroupCount {
    pub fn new(start: usize, len: usize, width: usize) -> Self {
        GroupCount::with_keys(vec![(start, len)], width)
    }

    /// Count groups formed by several `(start, len)` key ranges.
    pub fn with_keys(keys: Vec<(usize, usize)>, width: usize) -> Self {
        GroupCount {
            keys,
            width,
            count: 0,
        }
    }

    /// Count whole-record groups.
    pub fn whole_record(width: usize) -> Self {
        GroupCount::new(0, usize::MAX, width)
    }
}

impl SumFields for GroupCount {
    fn reset(&mut self) {
        self.count = 0;
    }

    fn add(&mut self, _record: &str) {
        self.count += 1;
    }

    fn summary(&self, first: &str) -> String {
        let mut out = String::with_capacity(first.len() + self.width);
        for &(start, len) in &self.keys {
            out.push_str(super::order::column_slice(first, start, len));
        }
        out.push_str(&format!("{:0width$}", self.count, width = self.width));
        out
    }
}
