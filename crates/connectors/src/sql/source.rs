use crate::sql::error::DbError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use model::{records::row::Record, schema::TableSchema};

/// Bounded read interface over a source table. The producer drives this with
/// day windows and page offsets; the engine never materializes a full table.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Earliest and latest value of a timestamp column, or `None` for an
    /// empty table.
    async fn timestamp_bounds(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, DbError>;

    /// One page of rows with `column` in `[from, to)`.
    async fn fetch_window(
        &self,
        schema: &TableSchema,
        column: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, DbError>;

    /// One page of rows from an un-windowed table scan.
    async fn fetch_page(
        &self,
        schema: &TableSchema,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, DbError>;
}
