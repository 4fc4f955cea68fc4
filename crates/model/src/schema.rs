use crate::core::data_type::DataType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        ColumnDef {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }
}

/// Statically declared (or introspected-once) descriptor of a target table.
/// Registered at startup and never re-reflected per record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(name: &str, columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Self {
        TableSchema {
            name: name.to_string(),
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k.eq_ignore_ascii_case(name))
    }
}
