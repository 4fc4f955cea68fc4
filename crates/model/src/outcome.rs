use serde::Serialize;
use std::path::PathBuf;

/// Result of committing one batch to the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    /// The whole batch landed as new rows through the bulk-insert tier.
    Committed,
    /// `added` rows inserted and `updated` rows updated. The mass-update tier
    /// reports every row as updated; reconciliation reports the actual split.
    PartiallyCommitted { added: usize, updated: usize },
    /// Retries were exhausted; the batch was serialized out-of-band for
    /// manual recovery. Never fatal to the surrounding table sync.
    Deferred {
        reason: String,
        snapshot_path: PathBuf,
    },
}
