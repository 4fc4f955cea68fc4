use crate::{
    error::{ProducerError, UpsertError},
    handler::SourceHandler,
    mapper::format_batch,
    producer::{BatchStats, DedupFilter, TableProducer},
    upsert::UpsertEngine,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use connectors::sql::{session::TargetStore, source::SourceReader};
use engine_core::window::WindowManager;
use model::{
    core::data_type::DataType,
    outcome::UpsertOutcome,
    records::batch::{Batch, ExistingKeySet},
    schema::TableSchema,
};
use std::sync::Arc;

/// Source database table to target table, optionally windowed by a timestamp
/// column and checkpointed through the tracker.
pub struct TableToTableHandler {
    source: Arc<dyn SourceReader>,
    /// Target shape under the source table's name; drives the reads.
    source_schema: TableSchema,
    schema: TableSchema,
    window_field: Option<String>,
    dedup_field: Option<String>,
    checkpoint: Option<NaiveDateTime>,
    chunk_size: usize,
    upsert: UpsertEngine,
    producer: Option<TableProducer>,
    up_to_date: bool,
}

impl TableToTableHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn SourceReader>,
        source_table: &str,
        schema: TableSchema,
        window_field: Option<String>,
        dedup_field: Option<String>,
        checkpoint: Option<NaiveDateTime>,
        chunk_size: usize,
        upsert: UpsertEngine,
    ) -> Self {
        let mut source_schema = schema.clone();
        source_schema.name = source_table.to_string();
        TableToTableHandler {
            source,
            source_schema,
            schema,
            window_field,
            dedup_field,
            checkpoint,
            chunk_size,
            upsert,
            producer: None,
            up_to_date: false,
        }
    }
}

#[async_trait]
impl SourceHandler for TableToTableHandler {
    fn table(&self) -> &str {
        &self.schema.name
    }

    async fn prepare(&mut self, store: &mut dyn TargetStore) -> Result<(), ProducerError> {
        let dedup = match &self.dedup_field {
            Some(field) => {
                let kind = self
                    .schema
                    .column(field)
                    .map(|c| c.data_type)
                    .unwrap_or(DataType::String);
                let keys: ExistingKeySet = store
                    .select_keys(&self.schema.name, field, kind)
                    .await?
                    .into_iter()
                    .collect();
                Some(DedupFilter::new(field, keys))
            }
            None => None,
        };

        self.producer = match &self.window_field {
            Some(column) => {
                let window = WindowManager::outstanding_window(
                    self.source.as_ref(),
                    &self.source_schema.name,
                    column,
                    self.checkpoint,
                )
                .await?;
                match window {
                    Some(window) => Some(TableProducer::windowed(
                        Arc::clone(&self.source),
                        self.source_schema.clone(),
                        column,
                        &window,
                        self.chunk_size,
                        dedup,
                    )),
                    None => {
                        self.up_to_date = true;
                        None
                    }
                }
            }
            None => Some(TableProducer::full_scan(
                Arc::clone(&self.source),
                self.source_schema.clone(),
                self.chunk_size,
                dedup,
            )),
        };
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError> {
        if self.up_to_date {
            return Ok(None);
        }
        match &mut self.producer {
            Some(producer) => producer.next_batch().await,
            None => Ok(None),
        }
    }

    fn format(&self, batch: Batch) -> Batch {
        format_batch(batch, &self.schema)
    }

    async fn commit_batch(
        &mut self,
        store: &mut dyn TargetStore,
        batch: &Batch,
    ) -> Result<UpsertOutcome, UpsertError> {
        self.upsert.commit(store, &self.schema, batch).await
    }
}
