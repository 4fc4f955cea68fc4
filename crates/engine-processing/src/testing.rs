//! In-memory stand-ins shared by the crate's tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use connectors::sql::{error::DbError, session::TargetStore};
use model::{
    core::{data_type::DataType, value::Value},
    records::row::Record,
    schema::TableSchema,
};
use std::collections::HashMap;

pub fn gone_away() -> DbError {
    DbError::MySql(mysql_async::Error::Server(mysql_async::ServerError {
        code: 2006,
        message: "MySQL server has gone away".into(),
        state: "HY000".into(),
    }))
}

pub type Key = Vec<Value>;

/// Transactional in-memory stand-in for the MySQL target session.
#[derive(Default)]
pub struct MemoryStore {
    pub committed: HashMap<Key, Record>,
    pub pending_inserts: Vec<(Key, Record)>,
    pub pending_updates: Vec<(Key, Record)>,
    pub checkpoints: HashMap<String, NaiveDateTime>,
    /// The next N insert statements fail with a transient server error.
    pub transient_failures: u32,
    /// Inserting a row with this key fails with an unclassified error.
    pub poison_key: Option<Key>,
    pub commits: u32,
    pub rollbacks: u32,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Record>, schema: &TableSchema) -> Self {
        let mut store = MemoryStore::default();
        for row in rows {
            let key = row.primary_key(schema).unwrap();
            store.committed.insert(key, row);
        }
        store
    }

    fn key_pending(&self, key: &Key) -> bool {
        self.pending_inserts.iter().any(|(k, _)| k == key)
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn bulk_insert(&mut self, schema: &TableSchema, rows: &[Record]) -> Result<(), DbError> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(gone_away());
        }
        let mut staged: Vec<(Key, Record)> = Vec::new();
        for row in rows {
            let key = row.primary_key(schema)?;
            if self.committed.contains_key(&key)
                || self.key_pending(&key)
                || staged.iter().any(|(k, _)| *k == key)
            {
                return Err(DbError::DuplicateKey(format!("key {key:?} exists")));
            }
            if self.poison_key.as_ref() == Some(&key) {
                return Err(DbError::UnknownTable(format!("{}_broken", schema.name)));
            }
            staged.push((key, row.clone()));
        }
        self.pending_inserts.extend(staged);
        Ok(())
    }

    async fn insert_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError> {
        self.bulk_insert(schema, std::slice::from_ref(row)).await
    }

    async fn update_row(&mut self, schema: &TableSchema, row: &Record) -> Result<(), DbError> {
        let key = row.primary_key(schema)?;
        if !self.committed.contains_key(&key) {
            return Err(DbError::StaleUpdate(format!("no row for key {key:?}")));
        }
        self.pending_updates.push((key, row.clone()));
        Ok(())
    }

    async fn select_keys(
        &mut self,
        _table: &str,
        _column: &str,
        _kind: DataType,
    ) -> Result<Vec<Value>, DbError> {
        Ok(self
            .committed
            .keys()
            .filter_map(|k| k.first().cloned())
            .collect())
    }

    async fn delete_keys(
        &mut self,
        _table: &str,
        _column: &str,
        keys: &[Value],
    ) -> Result<u64, DbError> {
        let before = self.committed.len();
        self.committed.retain(|k, _| !keys.contains(&k[0]));
        Ok((before - self.committed.len()) as u64)
    }

    async fn load_checkpoint(&mut self, identity: &str) -> Result<Option<NaiveDateTime>, DbError> {
        Ok(self.checkpoints.get(identity).copied())
    }

    async fn save_checkpoint(&mut self, identity: &str, ts: NaiveDateTime) -> Result<(), DbError> {
        self.checkpoints.insert(identity.to_string(), ts);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        for (key, row) in self.pending_inserts.drain(..) {
            self.committed.insert(key, row);
        }
        for (key, row) in self.pending_updates.drain(..) {
            self.committed.insert(key, row);
        }
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.pending_inserts.clear();
        self.pending_updates.clear();
        self.rollbacks += 1;
        Ok(())
    }
}
