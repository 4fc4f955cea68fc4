use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Append-only record of source files the run could not read. A skipped file
/// never fails the task; the log is how an operator finds out.
pub struct SkippedFileLog {
    path: PathBuf,
}

impl SkippedFileLog {
    pub fn new(path: &Path) -> Self {
        SkippedFileLog {
            path: path.to_path_buf(),
        }
    }

    pub fn record(&self, file: &Path, reason: &str) {
        warn!(file = %file.display(), reason, "skipping unreadable source file");
        let entry = format!("Skipped {}: {reason}\n", file.display());
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(entry.as_bytes()));
        if let Err(err) = appended {
            warn!(error = %err, "could not append to the skipped-file log");
        }
    }
}
