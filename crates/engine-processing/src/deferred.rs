use crate::error::DeferredError;
use chrono::Utc;
use model::records::batch::Batch;
use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;
use uuid::Uuid;

/// Serializes batches that exhausted their retries so an operator can replay
/// them later. One JSON snapshot per batch plus an append-only error log.
pub struct DeferredBatchWriter {
    snapshot_dir: PathBuf,
    error_log: PathBuf,
}

impl DeferredBatchWriter {
    pub fn new(snapshot_dir: &Path, error_log: &Path) -> Self {
        DeferredBatchWriter {
            snapshot_dir: snapshot_dir.to_path_buf(),
            error_log: error_log.to_path_buf(),
        }
    }

    /// Writes the batch snapshot and logs the reason. Returns the snapshot
    /// path so the outcome can point at it.
    pub fn write(&self, batch: &Batch, reason: &str) -> Result<PathBuf, DeferredError> {
        create_dir_all(&self.snapshot_dir)?;

        let name = format!("deferred-{}-{}.json", batch.table, Uuid::new_v4());
        let path = self.snapshot_dir.join(name);
        serde_json::to_writer_pretty(File::create(&path)?, batch)?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log)?;
        writeln!(
            log,
            "{} deferred {} rows for '{}': {reason}",
            Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S"),
            batch.len(),
            batch.table
        )?;

        info!(
            table = %batch.table,
            rows = batch.len(),
            path = %path.display(),
            "batch deferred for manual recovery"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::value::Value,
        records::row::{FieldValue, Record},
    };
    use tempfile::tempdir;

    fn batch() -> Batch {
        Batch::new(
            "videos",
            vec![Record::new(
                "videos",
                vec![FieldValue {
                    name: "video_id".into(),
                    value: Value::String("a".into()),
                }],
            )],
        )
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let writer = DeferredBatchWriter::new(dir.path(), &dir.path().join("errors.log"));

        let path = writer.write(&batch(), "server has gone away").unwrap();
        assert!(path.exists());

        let restored: Batch =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(restored.table, "videos");
        assert_eq!(restored.rows[0].value("video_id"), Value::String("a".into()));
    }

    #[test]
    fn reasons_append_to_the_error_log() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("errors.log");
        let writer = DeferredBatchWriter::new(dir.path(), &log);

        writer.write(&batch(), "first").unwrap();
        writer.write(&batch(), "second").unwrap();

        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
    }

    #[test]
    fn snapshot_names_never_collide() {
        let dir = tempdir().unwrap();
        let writer = DeferredBatchWriter::new(dir.path(), &dir.path().join("errors.log"));

        let a = writer.write(&batch(), "x").unwrap();
        let b = writer.write(&batch(), "x").unwrap();
        assert_ne!(a, b);
    }
}
