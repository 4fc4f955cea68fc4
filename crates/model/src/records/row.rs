use crate::{core::value::Value, schema::TableSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record for '{table}' has no value for primary key column '{column}'")]
    MissingKey { table: String, column: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

/// One logical row with a fixed set of named, typed fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub table: String,
    pub fields: Vec<FieldValue>,
}

impl Record {
    pub fn new(table: &str, fields: Vec<FieldValue>) -> Self {
        Record {
            table: table.to_string(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
            .map(|f| &f.value)
    }

    pub fn value(&self, field: &str) -> Value {
        self.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(field))
        {
            Some(f) => f.value = value,
            None => self.fields.push(FieldValue {
                name: field.to_string(),
                value,
            }),
        }
    }

    /// Resolves the record's primary key in schema key order. Every record
    /// destined for upsert must produce a complete, non-null key.
    pub fn primary_key(&self, schema: &TableSchema) -> Result<Vec<Value>, RecordError> {
        schema
            .primary_key
            .iter()
            .map(|col| match self.get(col) {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(RecordError::MissingKey {
                    table: self.table.clone(),
                    column: col.clone(),
                }),
            })
            .collect()
    }
}
