use crate::sql::{
    convert::{quote_ident, record_from_row, to_sql},
    error::DbError,
    source::SourceReader,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use model::{
    connection::ConnInfo,
    core::{data_type::DataType, value::Value},
    records::row::Record,
    schema::{ColumnDef, TableSchema},
};
use mysql_async::{Pool, prelude::Queryable};
use tracing::{debug, warn};

const INTROSPECT_SQL: &str = "SELECT column_name, data_type, is_nullable, column_key \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY ordinal_position";

/// Pool-backed MySQL adapter used for source reads and one-time schema
/// introspection. Writes go through `TargetSession`, never through the pool.
#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
}

impl MySqlAdapter {
    pub fn connect(info: &ConnInfo) -> Result<Self, DbError> {
        let pool = Pool::from_url(info.url()).map_err(DbError::from_driver)?;
        Ok(MySqlAdapter { pool })
    }

    /// Reflects a table's shape once; the schema registry caches the result.
    pub async fn introspect(&self, table: &str) -> Result<TableSchema, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(DbError::from_driver)?;
        let rows: Vec<(String, String, String, String)> = conn
            .exec(INTROSPECT_SQL, (table,))
            .await
            .map_err(DbError::from_driver)?;

        if rows.is_empty() {
            return Err(DbError::UnknownTable(table.to_string()));
        }

        let mut columns = Vec::with_capacity(rows.len());
        let mut primary_key = Vec::new();
        for (name, type_name, is_nullable, column_key) in rows {
            columns.push(ColumnDef::new(
                &name,
                DataType::from_mysql_type(&type_name),
                is_nullable.eq_ignore_ascii_case("YES"),
            ));
            if column_key == "PRI" {
                primary_key.push(name);
            }
        }

        debug!(table, columns = columns.len(), "introspected table");
        Ok(TableSchema::new(table, columns, primary_key))
    }

    pub async fn disconnect(self) {
        // A pool failing to close cleanly at shutdown is not fatal.
        if let Err(err) = self.pool.disconnect().await {
            warn!(error = %err, "source pool did not close cleanly");
        }
    }
}

#[async_trait]
impl SourceReader for MySqlAdapter {
    async fn timestamp_bounds(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(DbError::from_driver)?;
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {table}",
            col = quote_ident(column),
            table = quote_ident(table)
        );
        let row: Option<(Option<NaiveDateTime>, Option<NaiveDateTime>)> =
            conn.query_first(sql).await.map_err(DbError::from_driver)?;

        Ok(match row {
            Some((Some(min), Some(max))) => Some((min, max)),
            _ => None,
        })
    }

    async fn fetch_window(
        &self,
        schema: &TableSchema,
        column: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(DbError::from_driver)?;
        let sql = window_sql(schema, column);
        let rows: Vec<mysql_async::Row> = conn
            .exec(
                sql,
                (
                    to_sql(&Value::Timestamp(from)),
                    to_sql(&Value::Timestamp(to)),
                    limit as u64,
                    offset as u64,
                ),
            )
            .await
            .map_err(DbError::from_driver)?;

        Ok(rows
            .into_iter()
            .map(|row| record_from_row(&schema.name, schema, row))
            .collect())
    }

    async fn fetch_page(
        &self,
        schema: &TableSchema,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(DbError::from_driver)?;
        let sql = page_sql(schema);
        let rows: Vec<mysql_async::Row> = conn
            .exec(sql, (limit as u64, offset as u64))
            .await
            .map_err(DbError::from_driver)?;

        Ok(rows
            .into_iter()
            .map(|row| record_from_row(&schema.name, schema, row))
            .collect())
    }
}

/// MySQL gives paged reads no ordering guarantee without ORDER BY; pages of
/// the same scan could overlap or skip rows. Ordering by the leading column
/// and the primary key makes consecutive offsets a stable partition.
fn order_by(schema: &TableSchema, leading: Option<&str>) -> String {
    let mut cols: Vec<&str> = Vec::new();
    if let Some(col) = leading {
        cols.push(col);
    }
    let keys: Vec<&str> = if schema.primary_key.is_empty() {
        schema.columns.iter().map(|c| c.name.as_str()).collect()
    } else {
        schema.primary_key.iter().map(|k| k.as_str()).collect()
    };
    for key in keys {
        if !cols.iter().any(|c| c.eq_ignore_ascii_case(key)) {
            cols.push(key);
        }
    }
    cols.iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn window_sql(schema: &TableSchema, column: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE {col} >= ? AND {col} < ? ORDER BY {order} LIMIT ? OFFSET ?",
        table = quote_ident(&schema.name),
        col = quote_ident(column),
        order = order_by(schema, Some(column)),
    )
}

fn page_sql(schema: &TableSchema) -> String {
    format!(
        "SELECT * FROM {table} ORDER BY {order} LIMIT ? OFFSET ?",
        table = quote_ident(&schema.name),
        order = order_by(schema, None),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(primary_key: Vec<String>) -> TableSchema {
        TableSchema::new(
            "videos_daily",
            vec![
                ColumnDef::new("video_id", DataType::String, false),
                ColumnDef::new("extracted_date", DataType::Timestamp, false),
                ColumnDef::new("total_views", DataType::Int, true),
            ],
            primary_key,
        )
    }

    #[test]
    fn window_pages_are_deterministically_ordered() {
        let sql = window_sql(
            &schema(vec!["video_id".into(), "extracted_date".into()]),
            "extracted_date",
        );
        assert!(sql.contains("ORDER BY `extracted_date`, `video_id` LIMIT"));
    }

    #[test]
    fn full_scan_pages_order_by_primary_key() {
        let sql = page_sql(&schema(vec!["video_id".into()]));
        assert!(sql.contains("ORDER BY `video_id` LIMIT"));
    }

    #[test]
    fn keyless_tables_order_by_every_column() {
        let sql = page_sql(&schema(vec![]));
        assert!(sql.contains("ORDER BY `video_id`, `extracted_date`, `total_views` LIMIT"));
    }
}
