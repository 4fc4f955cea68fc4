use connectors::sql::error::DbError;
use engine_core::error::RegistryError;
use engine_processing::error::{ProducerError, UpsertError};
use thiserror::Error;

/// Anything that stops one sync task. The orchestrator records it against
/// the task and moves on; sibling tasks are unaffected.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error(transparent)]
    Upsert(#[from] UpsertError),

    #[error("Target store error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("No connection named '{0}' in the run configuration")]
    MissingConnection(String),

    #[error("Task needs a {0} client, but none is configured")]
    MissingClient(&'static str),

    #[error("Task '{0}' has no dedup or primary-key field to reconcile on")]
    MissingKeyField(String),
}
