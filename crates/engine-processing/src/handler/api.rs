use crate::{
    error::{ProducerError, UpsertError},
    handler::SourceHandler,
    mapper::{format_batch, sniff_columns},
    producer::BatchStats,
    upsert::UpsertEngine,
};
use async_trait::async_trait;
use connectors::{
    hydration::HydrationClient,
    json::record_from_json,
    sql::session::TargetStore,
};
use model::{
    core::{data_type::DataType, value::Value},
    outcome::UpsertOutcome,
    records::{
        batch::{Batch, ExistingKeySet},
        row::Record,
    },
    schema::TableSchema,
};
use std::sync::Arc;
use tracing::warn;

/// Known record ids hydrated through an external API into a target table.
/// Ids the target already holds are dropped before hydration, so a re-run
/// never repeats network work it does not need.
pub struct ApiToTableHandler {
    client: Arc<dyn HydrationClient>,
    ids: Vec<String>,
    cursor: usize,
    schema: TableSchema,
    id_field: String,
    existing: ExistingKeySet,
    chunk_size: usize,
    upsert: UpsertEngine,
}

impl ApiToTableHandler {
    pub fn new(
        client: Arc<dyn HydrationClient>,
        ids: Vec<String>,
        schema: TableSchema,
        id_field: String,
        chunk_size: usize,
        upsert: UpsertEngine,
    ) -> Self {
        ApiToTableHandler {
            client,
            ids,
            cursor: 0,
            schema,
            id_field,
            existing: ExistingKeySet::new(),
            chunk_size,
            upsert,
        }
    }
}

#[async_trait]
impl SourceHandler for ApiToTableHandler {
    fn table(&self) -> &str {
        &self.schema.name
    }

    async fn prepare(&mut self, store: &mut dyn TargetStore) -> Result<(), ProducerError> {
        // hydration ids are textual, so the key comparison stays in text space
        self.existing = store
            .select_keys(&self.schema.name, &self.id_field, DataType::String)
            .await?
            .into_iter()
            .collect();
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError> {
        let mut skipped: u64 = 0;

        loop {
            if self.cursor >= self.ids.len() {
                return Ok(None);
            }
            let end = (self.cursor + self.chunk_size).min(self.ids.len());
            let page = &self.ids[self.cursor..end];
            self.cursor = end;

            let fresh: Vec<String> = page
                .iter()
                .filter(|id| !self.existing.contains(&Value::String((*id).clone())))
                .cloned()
                .collect();
            skipped += (page.len() - fresh.len()) as u64;
            if fresh.is_empty() {
                continue;
            }

            let payloads = self.client.hydrate(&fresh).await?;
            let rows: Vec<Record> = payloads
                .iter()
                .filter_map(|payload| {
                    let record = record_from_json(&self.schema.name, payload);
                    if record.is_none() {
                        warn!(table = %self.schema.name, "dropping non-object hydration payload");
                    }
                    record
                })
                .collect();

            let stats = BatchStats {
                rows_read: rows.len() as u64,
                duplicates_skipped: skipped,
            };
            return Ok(Some((Batch::new(&self.schema.name, rows), stats)));
        }
    }

    fn format(&self, batch: Batch) -> Batch {
        format_batch(sniff_columns(batch), &self.schema)
    }

    async fn commit_batch(
        &mut self,
        store: &mut dyn TargetStore,
        batch: &Batch,
    ) -> Result<UpsertOutcome, UpsertError> {
        self.upsert.commit(store, &self.schema, batch).await
    }
}
