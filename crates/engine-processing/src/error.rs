use connectors::{
    file::error::FileError, grid::GridError, hydration::HydrationError, sql::error::DbError,
};
use engine_core::error::WindowError;
use thiserror::Error;

/// Failures while producing batches from a source. Fatal to the task; file
/// sources additionally downgrade per-file failures to skips before they
/// reach this type.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Source read failed: {0}")]
    Db(#[from] DbError),

    #[error("File source failed: {0}")]
    File(#[from] FileError),

    #[error("Spreadsheet source failed: {0}")]
    Grid(#[from] GridError),

    #[error("Hydration source failed: {0}")]
    Hydration(#[from] HydrationError),

    #[error("Window resolution failed: {0}")]
    Window(#[from] WindowError),
}

#[derive(Debug, Error)]
pub enum DeferredError {
    #[error("Failed to write deferred snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize deferred batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Terminal failures of a batch commit. Transient errors and key conflicts
/// are handled inside the engine and never surface here.
#[derive(Debug, Error)]
pub enum UpsertError {
    /// A uniqueness violation arrived while updates are disabled. The
    /// operator asked for insert-only semantics, so this stops the task.
    #[error("Duplicate key with updates disabled: {0}")]
    PolicyViolation(String),

    /// An individual record failed reconciliation with an error that is
    /// neither a duplicate nor transient.
    #[error("Record in '{table}' failed reconciliation: {source}")]
    RecordFatal { table: String, source: DbError },

    #[error("Target store error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Snapshot(#[from] DeferredError),
}
