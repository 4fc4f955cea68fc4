use serde::Deserialize;
use std::path::PathBuf;

/// Where a task's rows come from. Connection names are resolved against the
/// run configuration when handlers are built.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDesc {
    /// A table in a source database, optionally windowed by a timestamp field.
    Table { connection: String, table: String },
    /// A single flat file.
    File { path: PathBuf },
    /// Every accepted file in a directory, in listing order.
    Directory { path: PathBuf },
    /// A spreadsheet read through the grid client.
    Spreadsheet { sheet_id: String },
    /// Per-id records fetched through the hydration client.
    Api { ids: Vec<String> },
}

/// One table or dataset to migrate. Constructed once per run from
/// configuration and discarded after the run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SyncTask {
    pub name: String,
    pub source: SourceDesc,
    /// Target table name.
    pub table: String,
    /// Primary-key field used for dedup filtering, when configured.
    #[serde(default)]
    pub dedup_field: Option<String>,
    /// Timestamp field driving incremental windowing, when configured.
    #[serde(default)]
    pub window_field: Option<String>,
    /// Checkpoint identity this task contributes to. Tasks sharing an
    /// identity advance their checkpoint together.
    #[serde(default)]
    pub source_identity: Option<String>,
    /// When set, rows absent from this pass are deleted from the target
    /// after all batches commit (full-replace reconciliation).
    #[serde(default)]
    pub replace_missing: bool,
}
