use crate::{
    error::{ProducerError, UpsertError},
    handler::SourceHandler,
    mapper::{format_batch, sniff_columns},
    producer::{BatchStats, DedupFilter, filter},
    upsert::UpsertEngine,
};
use async_trait::async_trait;
use connectors::{
    grid::SpreadsheetClient,
    sql::{error::DbError, session::TargetStore},
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
use std::{collections::HashSet, sync::Arc};
use tracing::info;

/// A curated spreadsheet to a target table. The sheet is the source of
/// truth: with `replace_missing` set, rows that disappeared from the sheet
/// are deleted from the target after all batches commit.
pub struct SpreadsheetToTableHandler {
    client: Arc<dyn SpreadsheetClient>,
    sheet_id: String,
    schema: TableSchema,
    key_field: String,
    chunk_size: usize,
    replace_missing: bool,
    upsert: UpsertEngine,
    dedup: Option<DedupFilter>,
    pending: Vec<Record>,
    observed: Vec<Value>,
}

impl SpreadsheetToTableHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn SpreadsheetClient>,
        sheet_id: String,
        schema: TableSchema,
        key_field: String,
        chunk_size: usize,
        replace_missing: bool,
        upsert: UpsertEngine,
    ) -> Self {
        SpreadsheetToTableHandler {
            client,
            sheet_id,
            schema,
            key_field,
            chunk_size,
            replace_missing,
            upsert,
            dedup: None,
            pending: Vec::new(),
            observed: Vec::new(),
        }
    }

    fn key_type(&self) -> DataType {
        self.schema
            .column(&self.key_field)
            .map(|c| c.data_type)
            .unwrap_or(DataType::String)
    }
}

#[async_trait]
impl SourceHandler for SpreadsheetToTableHandler {
    fn table(&self) -> &str {
        &self.schema.name
    }

    async fn prepare(&mut self, store: &mut dyn TargetStore) -> Result<(), ProducerError> {
        let keys: ExistingKeySet = store
            .select_keys(&self.schema.name, &self.key_field, self.key_type())
            .await?
            .into_iter()
            .collect();
        self.dedup = Some(DedupFilter::new(&self.key_field, keys));

        let grid = self.client.fetch_grid(&self.sheet_id).await?;
        let mut records = grid.into_records(&self.schema.name);
        records.reverse(); // popped back-to-front below
        self.pending = records;
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = self.chunk_size.min(self.pending.len());
        let rows: Vec<Record> = (0..take).filter_map(|_| self.pending.pop()).collect();

        // every sheet row counts as observed, filtered or not; a row that is
        // present but unchanged must survive replace_missing
        for row in &rows {
            let key = row.value(&self.key_field);
            if !key.is_null() {
                self.observed.push(key);
            }
        }

        let mut batch = Batch::new(&self.schema.name, rows);
        let stats = filter(&self.dedup, &mut batch);
        Ok(Some((batch, stats)))
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

    async fn post_operations(&mut self, store: &mut dyn TargetStore) -> Result<(), DbError> {
        if !self.replace_missing {
            return Ok(());
        }
        let observed: HashSet<&Value> = self.observed.iter().collect();
        let stale: Vec<Value> = store
            .select_keys(&self.schema.name, &self.key_field, self.key_type())
            .await?
            .into_iter()
            .filter(|key| !observed.contains(key))
            .collect();

        if !stale.is_empty() {
            let deleted = store
                .delete_keys(&self.schema.name, &self.key_field, &stale)
                .await?;
            store.commit().await?;
            info!(
                table = %self.schema.name,
                deleted,
                "removed rows no longer present in the sheet"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deferred::DeferredBatchWriter, testing::MemoryStore};
    use connectors::grid::{GridError, SheetGrid};
    use engine_core::retry::RetryPolicy;
    use model::{
        core::data_type::DataType,
        records::row::FieldValue,
        schema::ColumnDef,
    };
    use std::time::Duration;
    use tempfile::tempdir;

    struct FakeSheet {
        grid: SheetGrid,
    }

    #[async_trait]
    impl SpreadsheetClient for FakeSheet {
        async fn fetch_grid(&self, _sheet_id: &str) -> Result<SheetGrid, GridError> {
            Ok(self.grid.clone())
        }
    }

    fn schema() -> TableSchema {
        TableSchema::new(
            "claims",
            vec![
                ColumnDef::new("claim_id", DataType::String, false),
                ColumnDef::new("title", DataType::String, true),
            ],
            vec!["claim_id".to_string()],
        )
    }

    fn seeded(id: &str) -> Record {
        Record::new(
            "claims",
            vec![
                FieldValue {
                    name: "claim_id".into(),
                    value: Value::String(id.into()),
                },
                FieldValue {
                    name: "title".into(),
                    value: Value::String("old".into()),
                },
            ],
        )
    }

    fn handler(grid: SheetGrid, dir: &std::path::Path) -> SpreadsheetToTableHandler {
        SpreadsheetToTableHandler::new(
            Arc::new(FakeSheet { grid }),
            "sheet-1".into(),
            schema(),
            "claim_id".into(),
            10,
            true,
            UpsertEngine::new(
                RetryPolicy::new(2, Duration::ZERO),
                true,
                DeferredBatchWriter::new(dir, &dir.join("errors.log")),
            ),
        )
    }

    async fn drain(
        handler: &mut SpreadsheetToTableHandler,
        store: &mut MemoryStore,
    ) {
        handler.prepare(store).await.unwrap();
        while let Some((batch, _)) = handler.next_batch().await.unwrap() {
            let shaped = handler.format(batch);
            handler.commit_batch(store, &shaped).await.unwrap();
        }
        handler.post_operations(store).await.unwrap();
    }

    #[tokio::test]
    async fn sheet_rows_land_under_normalized_headers() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore::default();
        let grid = SheetGrid {
            header: vec!["Claim Id".into(), "Title".into()],
            rows: vec![vec!["c1".into(), "first".into()]],
        };

        drain(&mut handler(grid, dir.path()), &mut store).await;

        let key = vec![Value::String("c1".into())];
        assert_eq!(store.committed[&key].value("title"), Value::String("first".into()));
    }

    #[tokio::test]
    async fn rows_missing_from_the_sheet_are_deleted() {
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![seeded("gone"), seeded("kept")], &sch);
        let grid = SheetGrid {
            header: vec!["Claim Id".into(), "Title".into()],
            rows: vec![vec!["kept".into(), "still here".into()]],
        };

        drain(&mut handler(grid, dir.path()), &mut store).await;

        assert_eq!(store.committed.len(), 1);
        assert!(store.committed.contains_key(&vec![Value::String("kept".into())]));
    }

    #[tokio::test]
    async fn unchanged_rows_survive_replacement() {
        // "kept" is filtered out as an existing key but still observed,
        // so the post-operation must not delete it
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![seeded("kept")], &sch);
        let grid = SheetGrid {
            header: vec!["Claim Id".into(), "Title".into()],
            rows: vec![vec!["kept".into(), "old".into()]],
        };

        drain(&mut handler(grid, dir.path()), &mut store).await;

        assert_eq!(store.committed.len(), 1);
    }
}
