use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type CompareFn = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// Total order over records, shared by the batch sort, every merge task and
/// the reduction operators.
///
/// Cloning is cheap: the comparison function sits behind an `Arc`.
#[derive(Clone)]
pub struct SortOrder {
    cmp: Arc<CompareFn>,
}

impl SortOrder {
    /// Order records with a caller-supplied comparison.
    pub fn new<F>(cmp: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        SortOrder { cmp: Arc::new(cmp) }
    }

    /// Lexicographic order of the whole record.
    pub fn natural() -> Self {
        SortOrder::new(|a, b| a.cmp(b))
    }

    /// Positional key: characters `[start, start + len)` of each record,
    /// compared lexicographically. Short records contribute what they have.
    pub fn columns(start: usize, len: usize) -> Self {
        SortOrder::new(move |a, b| column_slice(a, start, len).cmp(column_slice(b, start, len)))
    }

    /// The same order, descending.
    pub fn reversed(&self) -> Self {
        let inner = Arc::clone(&self.cmp);
        SortOrder::new(move |a, b| inner(b, a))
    }

    /// Break ties of `self` with `next`.
    pub fn then(&self, next: &SortOrder) -> Self {
        let first = Arc::clone(&self.cmp);
        let second = Arc::clone(&next.cmp);
        SortOrder::new(move |a, b| match first(a, b) {
            Ordering::Equal => second(a, b),
            ord => ord,
        })
    }

    #[inline]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        (self.cmp)(a, b)
    }

    /// True when `a` and `b` belong to the same group.
    #[inline]
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::natural()
    }
}

impl fmt::Debug for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SortOrder(..)")
    }
}

/// Characters `[start, start + len)` of `record`, clamped to its length.
pub fn column_slice(record: &str, start: usize, len: usize) -> &str {
    if record.is_ascii() {
        let s = start.min(record.len());
        let e = start.saturating_add(len).min(record.len());
        return &record[s..e];
    }
    let byte_at = |chars: usize| {
        record
            .char_indices()
            .nth(chars)
            .map_or(record.len(), |(i, _)| i)
    };
    let s = byte_at(start);
    let e = byte_at(start.saturating_add(len));
    &record[s..e]
}
