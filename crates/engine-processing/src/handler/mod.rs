pub mod api;
pub mod file;
pub mod spreadsheet;
pub mod table;

use crate::{error::ProducerError, error::UpsertError, producer::BatchStats};
use async_trait::async_trait;
use connectors::sql::{error::DbError, session::TargetStore};
use model::{outcome::UpsertOutcome, records::batch::Batch};

/// One source kind feeding one target table. The orchestrator drives every
/// task through the same four steps regardless of where the rows come from:
/// prepare, stream batches, shape them, commit them. Task-specific cleanup
/// hangs off `post_operations`.
#[async_trait]
pub trait SourceHandler: Send {
    /// Target table this handler feeds.
    fn table(&self) -> &str;

    /// Loads the existing-key set, resolves the sync window, opens the
    /// producer. Runs once before the first batch.
    async fn prepare(&mut self, store: &mut dyn TargetStore) -> Result<(), ProducerError>;

    /// Next filtered batch with its read totals, `None` when drained.
    async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError>;

    /// Shapes a raw batch for the target table.
    fn format(&self, batch: Batch) -> Batch;

    /// Commits one shaped batch through the upsert engine.
    async fn commit_batch(
        &mut self,
        store: &mut dyn TargetStore,
        batch: &Batch,
    ) -> Result<UpsertOutcome, UpsertError>;

    /// Reconciliation after all batches committed. Default: nothing.
    async fn post_operations(&mut self, _store: &mut dyn TargetStore) -> Result<(), DbError> {
        Ok(())
    }
}
