use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed file '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("Not an accepted file type: '{0}'")]
    UnsupportedExtension(PathBuf),
}
