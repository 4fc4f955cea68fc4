use crate::sql::{
    convert::{from_sql, quote_ident, to_sql},
    error::DbError,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use model::{
    connection::ConnInfo,
    core::{data_type::DataType, value::Value},
    records::row::Record,
    schema::TableSchema,
};
use mysql_async::{Conn, Opts, OptsBuilder, prelude::Queryable};
use tracing::{debug, warn};

/// Bookkeeping table holding per-source-identity high-water marks.
pub const TRACKER_TABLE: &str = "tracker";

/// Write interface of the target store: row insert/update/delete, bulk key
/// reads, the checkpoint bookkeeping table, and transactional commit/rollback.
/// The upsert engine and the orchestrator only ever see this trait; the
/// session is the single shared, mutable resource of a table sync.
#[async_trait]
pub trait TargetStore: Send {
    /// Adds all rows as new rows in one statement and flushes.
    async fn bulk_insert(&mut self, schema: &TableSchema, rows: &[Record]) -> Result<(), DbError>;

    async fn insert_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError>;

    /// Updates non-key columns by primary key. Returns `StaleUpdate` when no
    /// existing row matches the record's key.
    async fn update_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError>;

    /// Every value of one column, decoded as `kind`. Keys must compare equal
    /// to source-row values of the same column type.
    async fn select_keys(
        &mut self,
        table: &str,
        column: &str,
        kind: DataType,
    ) -> Result<Vec<Value>, DbError>;

    async fn delete_keys(
        &mut self,
        table: &str,
        column: &str,
        keys: &[Value],
    ) -> Result<u64, DbError>;

    async fn load_checkpoint(&mut self, identity: &str) -> Result<Option<NaiveDateTime>, DbError>;

    async fn save_checkpoint(&mut self, identity: &str, ts: NaiveDateTime)
    -> Result<(), DbError>;

    /// Commits flushed work, unless the run is a dry run.
    async fn commit(&mut self) -> Result<(), DbError>;

    /// Reverts to the last committed boundary, never partially.
    async fn rollback(&mut self) -> Result<(), DbError>;
}

/// Dedicated write connection with autocommit off. `CLIENT_FOUND_ROWS` is
/// negotiated so an UPDATE reports matched rows rather than changed rows; the
/// stale-update check depends on that.
pub struct TargetSession {
    conn: Conn,
    commit_writes: bool,
}

impl TargetSession {
    pub async fn open(info: &ConnInfo, commit_writes: bool) -> Result<Self, DbError> {
        let opts = Opts::from_url(&info.url()).map_err(mysql_async::Error::from)?;
        let opts = OptsBuilder::from_opts(opts).client_found_rows(true);
        let mut conn = Conn::new(opts).await.map_err(DbError::from_driver)?;
        conn.query_drop("SET autocommit = 0")
            .await
            .map_err(DbError::from_driver)?;

        Ok(TargetSession {
            conn,
            commit_writes,
        })
    }

    pub async fn close(self) {
        // Failing to close cleanly at shutdown is logged, not fatal.
        if let Err(err) = self.conn.disconnect().await {
            warn!(error = %err, "target session did not close cleanly");
        }
    }

    fn insert_sql(schema: &TableSchema, columns: &[String], row_count: usize) -> String {
        let cols = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let tuples = vec![format!("({placeholders})"); row_count].join(", ");
        format!(
            "INSERT INTO {} ({cols}) VALUES {tuples}",
            quote_ident(&schema.name)
        )
    }

    fn key_predicate(schema: &TableSchema) -> String {
        schema
            .primary_key
            .iter()
            .map(|k| format!("{} = ?", quote_ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[async_trait]
impl TargetStore for TargetSession {
    async fn bulk_insert(&mut self, schema: &TableSchema, rows: &[Record]) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let columns: Vec<String> = rows[0].fields.iter().map(|f| f.name.clone()).collect();
        let sql = Self::insert_sql(schema, &columns, rows.len());

        let mut params = Vec::with_capacity(columns.len() * rows.len());
        for row in rows {
            for col in &columns {
                params.push(to_sql(&row.value(col)));
            }
        }

        self.conn
            .exec_drop(sql, params)
            .await
            .map_err(DbError::from_driver)
    }

    async fn insert_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError> {
        self.bulk_insert(schema, std::slice::from_ref(row)).await
    }

    async fn update_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError> {
        let key = row.primary_key(schema)?;
        let settable: Vec<&str> = row
            .fields
            .iter()
            .filter(|f| !schema.is_key_column(&f.name))
            .map(|f| f.name.as_str())
            .collect();

        if settable.is_empty() {
            // Key-only table: nothing to set, but the row must exist for the
            // update tier to count it as matched.
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                quote_ident(&schema.name),
                Self::key_predicate(schema)
            );
            let params: Vec<mysql_async::Value> = key.iter().map(to_sql).collect();
            let count: Option<u64> = self
                .conn
                .exec_first(sql, params)
                .await
                .map_err(DbError::from_driver)?;
            if count.unwrap_or(0) == 0 {
                return Err(DbError::StaleUpdate(format!(
                    "no row in '{}' for key {key:?}",
                    schema.name
                )));
            }
            return Ok(());
        }

        let assignments = settable
            .iter()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {}",
            quote_ident(&schema.name),
            Self::key_predicate(schema)
        );

        let mut params: Vec<mysql_async::Value> =
            settable.iter().map(|c| to_sql(&row.value(c))).collect();
        params.extend(key.iter().map(to_sql));

        self.conn
            .exec_drop(sql, params)
            .await
            .map_err(DbError::from_driver)?;

        if self.conn.affected_rows() == 0 {
            return Err(DbError::StaleUpdate(format!(
                "no row in '{}' for key {key:?}",
                schema.name
            )));
        }
        Ok(())
    }

    async fn select_keys(
        &mut self,
        table: &str,
        column: &str,
        kind: DataType,
    ) -> Result<Vec<Value>, DbError> {
        let sql = format!(
            "SELECT {} FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        let raw: Vec<mysql_async::Value> =
            self.conn.query(sql).await.map_err(DbError::from_driver)?;
        Ok(decode_keys(raw, kind))
    }

    async fn delete_keys(
        &mut self,
        table: &str,
        column: &str,
        keys: &[Value],
    ) -> Result<u64, DbError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        // Bounded IN lists; reference tables are small but the bound keeps
        // the statement size predictable.
        for chunk in keys.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({placeholders})",
                quote_ident(table),
                quote_ident(column)
            );
            let params: Vec<mysql_async::Value> = chunk.iter().map(to_sql).collect();
            self.conn
                .exec_drop(sql, params)
                .await
                .map_err(DbError::from_driver)?;
            deleted += self.conn.affected_rows();
        }
        Ok(deleted)
    }

    async fn load_checkpoint(&mut self, identity: &str) -> Result<Option<NaiveDateTime>, DbError> {
        let sql = format!(
            "SELECT last_synchronized_at FROM {} WHERE source_identity = ?",
            quote_ident(TRACKER_TABLE)
        );
        let row: Option<Option<NaiveDateTime>> = self
            .conn
            .exec_first(sql, (identity,))
            .await
            .map_err(DbError::from_driver)?;
        Ok(row.flatten())
    }

    async fn save_checkpoint(
        &mut self,
        identity: &str,
        ts: NaiveDateTime,
    ) -> Result<(), DbError> {
        let sql = format!(
            "INSERT INTO {} (source_identity, last_synchronized_at) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE last_synchronized_at = VALUES(last_synchronized_at)",
            quote_ident(TRACKER_TABLE)
        );
        self.conn
            .exec_drop(sql, (identity, to_sql(&Value::Timestamp(ts))))
            .await
            .map_err(DbError::from_driver)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if !self.commit_writes {
            debug!("dry run: leaving transaction open, nothing committed");
            return Ok(());
        }
        self.conn
            .query_drop("COMMIT")
            .await
            .map_err(DbError::from_driver)
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.conn
            .query_drop("ROLLBACK")
            .await
            .map_err(DbError::from_driver)
    }
}

/// Text-protocol results arrive as bytes regardless of column type; decoding
/// with the declared type keeps keys comparable to binary-protocol source
/// values (`Value::Int(5)`, not `Value::String("5")`).
fn decode_keys(raw: Vec<mysql_async::Value>, kind: DataType) -> Vec<Value> {
    raw.into_iter().map(|v| from_sql(v, kind)).collect()
}
