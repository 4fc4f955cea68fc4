use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    String,
    Boolean,
    Timestamp,
    Json,
    Null,
}

impl DataType {
    /// Maps a MySQL `information_schema` column type name onto the engine's
    /// value taxonomy. Unknown types land on `String`, which MySQL will accept
    /// for any textual column and which keeps introspection total.
    pub fn from_mysql_type(type_name: &str) -> Self {
        let normalized = type_name
            .split('(')
            .next()
            .unwrap_or(type_name)
            .trim()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                DataType::Int
            }
            "float" | "double" | "decimal" | "numeric" | "real" => DataType::Float,
            "bool" | "boolean" => DataType::Boolean,
            "date" | "datetime" | "timestamp" => DataType::Timestamp,
            "json" => DataType::Json,
            _ => DataType::String,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "Int",
            DataType::Float => "Float",
            DataType::String => "String",
            DataType::Boolean => "Boolean",
            DataType::Timestamp => "Timestamp",
            DataType::Json => "Json",
            DataType::Null => "Null",
        };
        f.write_str(name)
    }
}
