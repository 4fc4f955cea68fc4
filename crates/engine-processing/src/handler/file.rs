use crate::{
    error::{ProducerError, UpsertError},
    handler::SourceHandler,
    mapper::{format_batch, sniff_columns},
    producer::{BatchStats, DedupFilter, FileProducer},
    skipped::SkippedFileLog,
    upsert::UpsertEngine,
};
use async_trait::async_trait;
use connectors::sql::session::TargetStore;
use model::{
    core::data_type::DataType,
    outcome::UpsertOutcome,
    records::batch::{Batch, ExistingKeySet},
    schema::TableSchema,
};
use std::path::PathBuf;

enum FileSet {
    Single(PathBuf),
    Directory(PathBuf),
}

/// Flat files (one or a directory of them) to a target table. Column types
/// are sniffed per batch since files carry no type information.
pub struct FileToTableHandler {
    files: FileSet,
    schema: TableSchema,
    dedup_field: Option<String>,
    chunk_size: usize,
    skipped_log: PathBuf,
    upsert: UpsertEngine,
    producer: Option<FileProducer>,
}

impl FileToTableHandler {
    pub fn single_file(
        path: PathBuf,
        schema: TableSchema,
        dedup_field: Option<String>,
        chunk_size: usize,
        skipped_log: PathBuf,
        upsert: UpsertEngine,
    ) -> Self {
        FileToTableHandler {
            files: FileSet::Single(path),
            schema,
            dedup_field,
            chunk_size,
            skipped_log,
            upsert,
            producer: None,
        }
    }

    pub fn directory(
        dir: PathBuf,
        schema: TableSchema,
        dedup_field: Option<String>,
        chunk_size: usize,
        skipped_log: PathBuf,
        upsert: UpsertEngine,
    ) -> Self {
        FileToTableHandler {
            files: FileSet::Directory(dir),
            schema,
            dedup_field,
            chunk_size,
            skipped_log,
            upsert,
            producer: None,
        }
    }
}

#[async_trait]
impl SourceHandler for FileToTableHandler {
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

        let log = SkippedFileLog::new(&self.skipped_log);
        self.producer = Some(match &self.files {
            FileSet::Single(path) => {
                FileProducer::single_file(path, &self.schema.name, self.chunk_size, dedup, log)
            }
            FileSet::Directory(dir) => {
                FileProducer::directory(dir, &self.schema.name, self.chunk_size, dedup, log)?
            }
        });
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError> {
        Ok(self.producer.as_mut().and_then(|p| p.next_batch()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deferred::DeferredBatchWriter, testing::MemoryStore};
    use engine_core::retry::RetryPolicy;
    use model::{
        core::{data_type::DataType, value::Value},
        schema::ColumnDef,
    };
    use std::{io::Write, time::Duration};
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema::new(
            "videos",
            vec![
                ColumnDef::new("video_id", DataType::String, false),
                ColumnDef::new("published_at", DataType::Timestamp, true),
                ColumnDef::new("views", DataType::Int, true),
            ],
            vec!["video_id".to_string()],
        )
    }

    #[tokio::test]
    async fn csv_file_lands_with_sniffed_types() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("videos.csv");
        std::fs::File::create(&csv)
            .unwrap()
            .write_all(b"Video Id,Published At,Views\na,2023-06-01,10\nb,2023-06-02,20\n")
            .unwrap();

        let mut store = MemoryStore::default();
        let mut handler = FileToTableHandler::single_file(
            csv,
            schema(),
            Some("video_id".to_string()),
            100,
            dir.path().join("skipped.txt"),
            UpsertEngine::new(
                RetryPolicy::new(2, Duration::ZERO),
                true,
                DeferredBatchWriter::new(dir.path(), &dir.path().join("errors.log")),
            ),
        );

        handler.prepare(&mut store).await.unwrap();
        while let Some((batch, _)) = handler.next_batch().await.unwrap() {
            let shaped = handler.format(batch);
            handler.commit_batch(&mut store, &shaped).await.unwrap();
        }

        assert_eq!(store.committed.len(), 2);
        let key = vec![Value::String("a".into())];
        // sniffed to a timestamp, then rendered canonically
        assert_eq!(
            store.committed[&key].value("published_at"),
            Value::String("2023-06-01 00:00:00".into())
        );
    }
}
