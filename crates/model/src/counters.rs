use serde::Serialize;
use std::ops::AddAssign;

/// Per-task running totals. Threaded through each batch-processing step as an
/// explicit value and merged by the orchestrator; never shared mutable state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounters {
    pub rows_read: u64,
    pub duplicates_skipped: u64,
    pub rows_added: u64,
    pub rows_updated: u64,
    pub batches_deferred: u64,
}

impl AddAssign for TaskCounters {
    fn add_assign(&mut self, other: Self) {
        self.rows_read += other.rows_read;
        self.duplicates_skipped += other.duplicates_skipped;
        self.rows_added += other.rows_added;
        self.rows_updated += other.rows_updated;
        self.batches_deferred += other.batches_deferred;
    }
}

impl TaskCounters {
    pub fn merge(mut self, other: Self) -> Self {
        self += other;
        self
    }
}
