use serde::Deserialize;
use std::path::PathBuf;

fn default_chunk_size() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("deferred")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("db_tools.log")
}

fn default_skipped_log() -> PathBuf {
    PathBuf::from("skipped_files.txt")
}

/// Run-wide behavior switches, loaded once from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    /// Selects the production target connection instead of the test one.
    #[serde(default = "default_true")]
    pub production: bool,
    /// When false, nothing is committed. For debugging.
    #[serde(default = "default_true")]
    pub commit: bool,
    /// When true, existing rows are updated on key collisions; when false a
    /// collision is fatal.
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
    #[serde(default = "default_skipped_log")]
    pub skipped_log: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            production: true,
            commit: true,
            update: true,
            chunk_size: default_chunk_size(),
            snapshot_dir: default_snapshot_dir(),
            error_log: default_error_log(),
            skipped_log: default_skipped_log(),
        }
    }
}
