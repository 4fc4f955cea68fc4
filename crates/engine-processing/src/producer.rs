use crate::{error::ProducerError, skipped::SkippedFileLog};
use chrono::NaiveDateTime;
use connectors::{
    file::reader::{FileSource, accepted_files},
    sql::source::SourceReader,
};
use engine_core::window::{SyncWindow, day_partitions};
use model::{
    records::batch::{Batch, ExistingKeySet},
    schema::TableSchema,
};
use std::{collections::VecDeque, path::Path, sync::Arc};
use tracing::debug;

/// Per-batch read totals, reported alongside each produced batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub rows_read: u64,
    pub duplicates_skipped: u64,
}

/// Drops rows whose key the target already holds. The key set is loaded once
/// per task; rows that slip past a stale set are caught by the upsert
/// engine's conflict path.
pub struct DedupFilter {
    field: String,
    existing: ExistingKeySet,
}

impl DedupFilter {
    pub fn new(field: &str, existing: ExistingKeySet) -> Self {
        DedupFilter {
            field: field.to_string(),
            existing,
        }
    }

    pub(crate) fn apply(&self, batch: &mut Batch) -> u64 {
        batch.filter_existing(&self.field, &self.existing) as u64
    }
}

pub(crate) fn filter(dedup: &Option<DedupFilter>, batch: &mut Batch) -> BatchStats {
    let rows_read = batch.len() as u64;
    let duplicates_skipped = match dedup {
        Some(d) => d.apply(batch),
        None => 0,
    };
    BatchStats {
        rows_read,
        duplicates_skipped,
    }
}

enum ScanMode {
    /// Day partitions of a sync window, each paged by offset.
    Windowed {
        column: String,
        partitions: VecDeque<(NaiveDateTime, NaiveDateTime)>,
        current: Option<(NaiveDateTime, NaiveDateTime)>,
        offset: usize,
    },
    Full { offset: usize, done: bool },
}

/// Streams bounded batches out of a source table. Windowed mode walks the
/// window one day at a time so a failure never loses more than a day of
/// progress; full mode pages a whole table.
pub struct TableProducer {
    source: Arc<dyn SourceReader>,
    schema: TableSchema,
    chunk_size: usize,
    dedup: Option<DedupFilter>,
    mode: ScanMode,
}

impl TableProducer {
    pub fn windowed(
        source: Arc<dyn SourceReader>,
        schema: TableSchema,
        column: &str,
        window: &SyncWindow,
        chunk_size: usize,
        dedup: Option<DedupFilter>,
    ) -> Self {
        TableProducer {
            source,
            schema,
            chunk_size,
            dedup,
            mode: ScanMode::Windowed {
                column: column.to_string(),
                partitions: day_partitions(window).into(),
                current: None,
                offset: 0,
            },
        }
    }

    pub fn full_scan(
        source: Arc<dyn SourceReader>,
        schema: TableSchema,
        chunk_size: usize,
        dedup: Option<DedupFilter>,
    ) -> Self {
        TableProducer {
            source,
            schema,
            chunk_size,
            dedup,
            mode: ScanMode::Full {
                offset: 0,
                done: false,
            },
        }
    }

    pub async fn next_batch(&mut self) -> Result<Option<(Batch, BatchStats)>, ProducerError> {
        loop {
            let rows = match &mut self.mode {
                ScanMode::Windowed {
                    column,
                    partitions,
                    current,
                    offset,
                } => {
                    let (from, to) = match *current {
                        Some(range) => range,
                        None => match partitions.pop_front() {
                            Some(range) => {
                                *current = Some(range);
                                *offset = 0;
                                debug!(
                                    table = %self.schema.name,
                                    from = %range.0,
                                    "starting day partition"
                                );
                                range
                            }
                            None => return Ok(None),
                        },
                    };
                    let rows = self
                        .source
                        .fetch_window(&self.schema, column, from, to, self.chunk_size, *offset)
                        .await?;
                    *offset += rows.len();
                    if rows.len() < self.chunk_size {
                        *current = None;
                    }
                    rows
                }
                ScanMode::Full { offset, done } => {
                    if *done {
                        return Ok(None);
                    }
                    let rows = self
                        .source
                        .fetch_page(&self.schema, self.chunk_size, *offset)
                        .await?;
                    *offset += rows.len();
                    if rows.len() < self.chunk_size {
                        *done = true;
                    }
                    rows
                }
            };

            if rows.is_empty() {
                continue;
            }
            let mut batch = Batch::new(&self.schema.name, rows);
            let stats = filter(&self.dedup, &mut batch);
            return Ok(Some((batch, stats)));
        }
    }
}

/// Streams batches out of one file or a directory of files. A file that
/// cannot be opened or read is logged as skipped and the producer moves to
/// the next one; file problems never fail the task.
pub struct FileProducer {
    table: String,
    chunk_size: usize,
    dedup: Option<DedupFilter>,
    pending: VecDeque<std::path::PathBuf>,
    current: Option<FileSource>,
    skipped: SkippedFileLog,
}

impl FileProducer {
    pub fn single_file(
        path: &Path,
        table: &str,
        chunk_size: usize,
        dedup: Option<DedupFilter>,
        skipped: SkippedFileLog,
    ) -> Self {
        FileProducer {
            table: table.to_string(),
            chunk_size,
            dedup,
            pending: VecDeque::from(vec![path.to_path_buf()]),
            current: None,
            skipped,
        }
    }

    pub fn directory(
        dir: &Path,
        table: &str,
        chunk_size: usize,
        dedup: Option<DedupFilter>,
        skipped: SkippedFileLog,
    ) -> Result<Self, ProducerError> {
        let files = accepted_files(dir)?;
        Ok(FileProducer {
            table: table.to_string(),
            chunk_size,
            dedup,
            pending: files.into(),
            current: None,
            skipped,
        })
    }

    pub fn next_batch(&mut self) -> Option<(Batch, BatchStats)> {
        loop {
            let mut source = match self.current.take() {
                Some(source) => source,
                None => {
                    let path = self.pending.pop_front()?;
                    match FileSource::open(&path, &self.table, self.chunk_size) {
                        Ok(source) => source,
                        Err(err) => {
                            self.skipped.record(&path, &err.to_string());
                            continue;
                        }
                    }
                }
            };

            match source.next_chunk() {
                Ok(Some(rows)) => {
                    let mut batch = Batch::new(&self.table, rows);
                    let stats = filter(&self.dedup, &mut batch);
                    self.current = Some(source);
                    return Some((batch, stats));
                }
                Ok(None) => continue,
                Err(err) => {
                    self.skipped.record(source.path(), &err.to_string());
                    continue;
                }
            }
        }
    }
}
