use crate::{file::error::FileError, json::record_from_json};
use calamine::{Data, Reader, Xlsx, open_workbook};
use model::{
    core::value::Value,
    records::row::{FieldValue, Record},
};
use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};
use tracing::debug;

/// File types a directory scan will pick up. Everything else is ignored.
pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "json", "jsonl", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Comma-delimited with a header row.
    Delimited,
    /// Spreadsheet workbook. The first sheet is read whole, header row first,
    /// with the cell types the workbook carries.
    Workbook,
    /// One JSON object per line.
    JsonLines,
    /// One plain-text line per record, single `line` column.
    PlainText,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileKind::Delimited),
            "xlsx" => Some(FileKind::Workbook),
            "json" | "jsonl" => Some(FileKind::JsonLines),
            "txt" => Some(FileKind::PlainText),
            _ => None,
        }
    }
}

/// Accepted files directly under `dir`, in listing order (name-sorted so a
/// re-run visits files in the same order).
pub fn accepted_files(dir: &Path) -> Result<Vec<PathBuf>, FileError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && FileKind::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Column names as the target schema spells them: lowercase, punctuation
/// collapsed to underscores.
pub fn normalize_col_name(name: &str) -> String {
    name.replace([' ', '-', '.', '(', ')', ','], "_").to_lowercase()
}

enum ReaderState {
    Csv {
        reader: csv::Reader<File>,
        headers: Vec<String>,
    },
    Lines {
        lines: Lines<BufReader<File>>,
        json: bool,
    },
    Sheet {
        pending: std::vec::IntoIter<Record>,
    },
}

/// Workbook cells carry their own types; empty and error cells land as null.
fn workbook_cell(cell: &Data) -> Value {
    match cell {
        Data::Int(v) => Value::Int(*v),
        Data::Float(v) => Value::Float(*v),
        Data::String(v) => Value::String(v.clone()),
        Data::Bool(v) => Value::Boolean(*v),
        Data::DateTime(v) => v.as_datetime().map(Value::Timestamp).unwrap_or(Value::Null),
        Data::DateTimeIso(v) | Data::DurationIso(v) => Value::String(v.clone()),
        Data::Empty | Data::Error(_) => Value::Null,
    }
}

/// Chunked reader over a single source file. Restartable only by reopening;
/// a failed file is skipped, not resumed.
pub struct FileSource {
    path: PathBuf,
    table: String,
    chunk_size: usize,
    state: ReaderState,
}

impl FileSource {
    pub fn open(path: &Path, table: &str, chunk_size: usize) -> Result<Self, FileError> {
        let kind = FileKind::from_path(path)
            .ok_or_else(|| FileError::UnsupportedExtension(path.to_path_buf()))?;

        let state = match kind {
            FileKind::Delimited => {
                let mut reader = csv::Reader::from_path(path)?;
                let headers = reader
                    .headers()?
                    .iter()
                    .map(normalize_col_name)
                    .collect::<Vec<_>>();
                ReaderState::Csv { reader, headers }
            }
            FileKind::JsonLines | FileKind::PlainText => {
                let file = File::open(path)?;
                ReaderState::Lines {
                    lines: BufReader::new(file).lines(),
                    json: kind == FileKind::JsonLines,
                }
            }
            FileKind::Workbook => {
                let mut workbook: Xlsx<_> = open_workbook(path)?;
                let range = workbook
                    .worksheet_range_at(0)
                    .ok_or_else(|| FileError::Malformed {
                        path: path.to_path_buf(),
                        reason: "workbook has no sheets".to_string(),
                    })??;

                let mut grid = range.rows();
                let headers: Vec<String> = grid
                    .next()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| normalize_col_name(&c.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                let records: Vec<Record> = grid
                    .map(|cells| {
                        let fields = headers
                            .iter()
                            .zip(cells)
                            .map(|(name, cell)| FieldValue {
                                name: name.clone(),
                                value: workbook_cell(cell),
                            })
                            .collect();
                        Record::new(table, fields)
                    })
                    .collect();
                ReaderState::Sheet {
                    pending: records.into_iter(),
                }
            }
        };

        debug!(path = %path.display(), table, "opened source file");
        Ok(FileSource {
            path: path.to_path_buf(),
            table: table.to_string(),
            chunk_size,
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next bounded chunk of records, `None` at end of file. An error midway
    /// through poisons the file; the caller logs it as skipped and moves on.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<Record>>, FileError> {
        let mut rows = Vec::with_capacity(self.chunk_size);

        match &mut self.state {
            ReaderState::Csv { reader, headers } => {
                for result in reader.records() {
                    let record = result?;
                    let fields = headers
                        .iter()
                        .zip(record.iter())
                        .map(|(name, raw)| FieldValue {
                            name: name.clone(),
                            value: Value::String(raw.to_string()),
                        })
                        .collect();
                    rows.push(Record::new(&self.table, fields));
                    if rows.len() >= self.chunk_size {
                        break;
                    }
                }
            }
            ReaderState::Lines { lines, json } => {
                for line in lines.by_ref() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = if *json {
                        let parsed: serde_json::Value =
                            serde_json::from_str(&line).map_err(|e| FileError::Malformed {
                                path: self.path.clone(),
                                reason: e.to_string(),
                            })?;
                        record_from_json(&self.table, &parsed).ok_or_else(|| {
                            FileError::Malformed {
                                path: self.path.clone(),
                                reason: "line is not a JSON object".to_string(),
                            }
                        })?
                    } else {
                        Record::new(
                            &self.table,
                            vec![FieldValue {
                                name: "line".to_string(),
                                value: Value::String(line),
                            }],
                        )
                    };
                    rows.push(record);
                    if rows.len() >= self.chunk_size {
                        break;
                    }
                }
            }
            ReaderState::Sheet { pending } => {
                rows.extend(pending.by_ref().take(self.chunk_size));
            }
        }

        Ok(if rows.is_empty() { None } else { Some(rows) })
    }
}
