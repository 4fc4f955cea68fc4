use crate::{deferred::DeferredBatchWriter, error::UpsertError};
use connectors::sql::{error::DbError, session::TargetStore};
use engine_core::retry::{RetryDisposition, RetryPolicy, classify_db_error};
use model::{
    outcome::UpsertOutcome,
    records::{batch::Batch, row::Record},
    schema::TableSchema,
};
use tracing::{info, warn};

/// Outcome of one protocol attempt, before retry bookkeeping.
enum TierError {
    /// Worth retrying the whole protocol after the back-off.
    Transient(String),
    /// Stops the task immediately.
    Fatal(UpsertError),
}

fn classify(err: DbError) -> TierError {
    match classify_db_error(&err) {
        RetryDisposition::Retry => TierError::Transient(err.to_string()),
        RetryDisposition::Stop => TierError::Fatal(UpsertError::Db(err)),
    }
}

enum UpdateFailure {
    Stale,
    Other(TierError),
}

/// Commits batches through a cascade of cheap-first strategies: one bulk
/// insert for the common all-new case, one mass update when every key turned
/// out to exist, and per-record reconciliation only for genuinely mixed
/// batches. Transient server errors restart the whole protocol under the
/// retry policy; exhausted batches are deferred to disk rather than lost.
pub struct UpsertEngine {
    policy: RetryPolicy,
    update_enabled: bool,
    deferred: DeferredBatchWriter,
}

impl UpsertEngine {
    pub fn new(policy: RetryPolicy, update_enabled: bool, deferred: DeferredBatchWriter) -> Self {
        UpsertEngine {
            policy,
            update_enabled,
            deferred,
        }
    }

    pub async fn commit(
        &self,
        store: &mut dyn TargetStore,
        schema: &TableSchema,
        batch: &Batch,
    ) -> Result<UpsertOutcome, UpsertError> {
        if batch.is_empty() {
            return Ok(UpsertOutcome::Committed);
        }

        let mut last_reason = String::new();
        for attempt in 0..self.policy.max_attempts {
            match self.attempt(store, schema, batch).await {
                Ok(outcome) => return Ok(outcome),
                Err(TierError::Fatal(err)) => {
                    rollback_quietly(store).await;
                    return Err(err);
                }
                Err(TierError::Transient(reason)) => {
                    rollback_quietly(store).await;
                    warn!(
                        table = %batch.table,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        reason = %reason,
                        "transient failure, batch will be retried"
                    );
                    last_reason = reason;
                    if !self.policy.is_final(attempt) {
                        self.policy.back_off().await;
                    }
                }
            }
        }

        let snapshot_path = self.deferred.write(batch, &last_reason)?;
        Ok(UpsertOutcome::Deferred {
            reason: last_reason,
            snapshot_path,
        })
    }

    /// One pass through the cascade. Every exit path either commits or
    /// leaves the store rolled back by the caller.
    async fn attempt(
        &self,
        store: &mut dyn TargetStore,
        schema: &TableSchema,
        batch: &Batch,
    ) -> Result<UpsertOutcome, TierError> {
        match store.bulk_insert(schema, &batch.rows).await {
            Ok(()) => {
                store.commit().await.map_err(classify)?;
                return Ok(UpsertOutcome::Committed);
            }
            Err(err) if err.is_duplicate_key() => {
                if !self.update_enabled {
                    return Err(TierError::Fatal(UpsertError::PolicyViolation(
                        err.to_string(),
                    )));
                }
                rollback_quietly(store).await;
                info!(table = %batch.table, "bulk insert hit existing keys, trying mass update");
            }
            Err(err) => return Err(classify(err)),
        }

        match self.update_all(store, schema, batch).await {
            Ok(()) => {
                store.commit().await.map_err(classify)?;
                return Ok(UpsertOutcome::PartiallyCommitted {
                    added: 0,
                    updated: batch.rows.len(),
                });
            }
            Err(UpdateFailure::Stale) => {
                rollback_quietly(store).await;
                info!(
                    table = %batch.table,
                    "mass update found missing rows, reconciling per record"
                );
            }
            Err(UpdateFailure::Other(err)) => return Err(err),
        }

        self.reconcile(store, schema, batch).await
    }

    /// Assumes every row already exists and updates them all. A stale update
    /// means the batch is mixed and this tier does not apply.
    async fn update_all(
        &self,
        store: &mut dyn TargetStore,
        schema: &TableSchema,
        batch: &Batch,
    ) -> Result<(), UpdateFailure> {
        for row in &batch.rows {
            match store.update_row(schema, row).await {
                Ok(()) => {}
                Err(err) if err.is_stale_update() => return Err(UpdateFailure::Stale),
                Err(err) => return Err(UpdateFailure::Other(classify(err))),
            }
        }
        Ok(())
    }

    /// Splits a mixed batch by probing each record with an insert. The probe
    /// inserts are thrown away by the final rollback; the classified sets are
    /// then applied in bulk and committed together.
    async fn reconcile(
        &self,
        store: &mut dyn TargetStore,
        schema: &TableSchema,
        batch: &Batch,
    ) -> Result<UpsertOutcome, TierError> {
        let mut added: Vec<Record> = Vec::new();
        let mut updated: Vec<&Record> = Vec::new();

        for row in &batch.rows {
            match store.insert_row(schema, row).await {
                Ok(()) => added.push(row.clone()),
                Err(err) if err.is_duplicate_key() => {
                    rollback_quietly(store).await;
                    updated.push(row);
                }
                Err(err) if classify_db_error(&err) == RetryDisposition::Retry => {
                    return Err(TierError::Transient(err.to_string()));
                }
                Err(err) => {
                    return Err(TierError::Fatal(UpsertError::RecordFatal {
                        table: batch.table.clone(),
                        source: err,
                    }));
                }
            }
        }

        rollback_quietly(store).await;
        store.bulk_insert(schema, &added).await.map_err(classify)?;
        for row in &updated {
            store.update_row(schema, row).await.map_err(classify)?;
        }
        store.commit().await.map_err(classify)?;

        info!(
            table = %batch.table,
            added = added.len(),
            updated = updated.len(),
            "mixed batch reconciled"
        );
        Ok(UpsertOutcome::PartiallyCommitted {
            added: added.len(),
            updated: updated.len(),
        })
    }
}

/// Rollback on an error path. If the rollback itself fails the connection is
/// in trouble anyway; the next attempt or the caller will surface that.
async fn rollback_quietly(store: &mut dyn TargetStore) {
    if let Err(err) = store.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use model::{
        core::{data_type::DataType, value::Value},
        records::row::FieldValue,
        schema::ColumnDef,
    };
    use std::time::Duration;
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema::new(
            "videos",
            vec![
                ColumnDef::new("video_id", DataType::String, false),
                ColumnDef::new("views", DataType::Int, true),
            ],
            vec!["video_id".to_string()],
        )
    }

    fn row(id: &str, views: i64) -> Record {
        Record::new(
            "videos",
            vec![
                FieldValue {
                    name: "video_id".into(),
                    value: Value::String(id.into()),
                },
                FieldValue {
                    name: "views".into(),
                    value: Value::Int(views),
                },
            ],
        )
    }

    fn engine(dir: &std::path::Path, update_enabled: bool, attempts: usize) -> UpsertEngine {
        UpsertEngine::new(
            RetryPolicy::new(attempts, Duration::ZERO),
            update_enabled,
            DeferredBatchWriter::new(dir, &dir.join("errors.log")),
        )
    }

    #[tokio::test]
    async fn empty_batch_commits_trivially() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore::default();
        let outcome = engine(dir.path(), true, 5)
            .commit(&mut store, &schema(), &Batch::new("videos", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Committed);
    }

    #[tokio::test]
    async fn all_new_rows_land_through_bulk_insert() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore::default();
        let batch = Batch::new("videos", vec![row("a", 1), row("b", 2)]);

        let outcome = engine(dir.path(), true, 5)
            .commit(&mut store, &schema(), &batch)
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Committed);
        assert_eq!(store.committed.len(), 2);
        assert_eq!(store.commits, 1);
    }

    #[tokio::test]
    async fn all_existing_rows_land_through_mass_update() {
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![row("a", 1), row("b", 2)], &sch);
        let batch = Batch::new("videos", vec![row("a", 10), row("b", 20)]);

        let outcome = engine(dir.path(), true, 5)
            .commit(&mut store, &sch, &batch)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::PartiallyCommitted {
                added: 0,
                updated: 2
            }
        );
        let key = vec![Value::String("a".into())];
        assert_eq!(store.committed[&key].value("views"), Value::Int(10));
    }

    #[tokio::test]
    async fn mixed_batch_reconciles_per_record() {
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![row("b", 2)], &sch);
        let batch = Batch::new("videos", vec![row("a", 1), row("b", 20), row("c", 3)]);

        let outcome = engine(dir.path(), true, 5)
            .commit(&mut store, &sch, &batch)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::PartiallyCommitted {
                added: 2,
                updated: 1
            }
        );
        assert_eq!(store.committed.len(), 3);
        let key = vec![Value::String("b".into())];
        assert_eq!(store.committed[&key].value("views"), Value::Int(20));
    }

    #[tokio::test]
    async fn duplicates_with_updates_disabled_are_fatal() {
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![row("a", 1)], &sch);
        let batch = Batch::new("videos", vec![row("a", 10), row("b", 2)]);

        let err = engine(dir.path(), false, 5)
            .commit(&mut store, &sch, &batch)
            .await
            .unwrap_err();

        assert!(matches!(err, UpsertError::PolicyViolation(_)));
        assert_eq!(store.commits, 0);
        assert_eq!(store.committed.len(), 1);
        assert_eq!(
            store.committed[&vec![Value::String("a".into())]].value("views"),
            Value::Int(1)
        );
    }

    #[tokio::test]
    async fn transient_errors_retry_and_then_succeed() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore {
            transient_failures: 2,
            ..MemoryStore::default()
        };
        let batch = Batch::new("videos", vec![row("a", 1)]);

        let outcome = engine(dir.path(), true, 5)
            .commit(&mut store, &schema(), &batch)
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Committed);
        assert_eq!(store.committed.len(), 1);
        assert_eq!(store.rollbacks, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_defer_the_batch() {
        let dir = tempdir().unwrap();
        let mut store = MemoryStore {
            transient_failures: 3,
            ..MemoryStore::default()
        };
        let batch = Batch::new("videos", vec![row("a", 1)]);

        let outcome = engine(dir.path(), true, 3)
            .commit(&mut store, &schema(), &batch)
            .await
            .unwrap();

        let UpsertOutcome::Deferred {
            reason,
            snapshot_path,
        } = outcome
        else {
            panic!("expected a deferred outcome");
        };
        assert!(reason.contains("gone away"));
        assert!(snapshot_path.exists());
        assert_eq!(store.commits, 0);
        assert!(store.committed.is_empty());
    }

    #[tokio::test]
    async fn unclassified_record_error_aborts_reconciliation() {
        let dir = tempdir().unwrap();
        let sch = schema();
        let mut store = MemoryStore::with_rows(vec![row("a", 1)], &sch);
        store.poison_key = Some(vec![Value::String("c".into())]);
        // "a" forces the duplicate path, "b" goes stale in the update tier,
        // and "c" then blows up during per-record classification.
        let batch = Batch::new("videos", vec![row("a", 10), row("b", 2), row("c", 3)]);

        let err = engine(dir.path(), true, 5)
            .commit(&mut store, &sch, &batch)
            .await
            .unwrap_err();

        assert!(matches!(err, UpsertError::RecordFatal { .. }));
        assert_eq!(store.commits, 0);
        assert_eq!(store.committed.len(), 1);
    }
}
