use crate::file::reader::normalize_col_name;
use async_trait::async_trait;
use model::{
    core::value::Value,
    records::row::{FieldValue, Record},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Spreadsheet API error: {0}")]
    Api(String),

    #[error("Spreadsheet '{0}' has no data")]
    Empty(String),
}

/// A 2-D grid of cell values with a header row, as returned by the
/// spreadsheet-reading client.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetGrid {
    /// Rows become records under normalized header names. Short rows pad
    /// with nulls; excess cells are dropped.
    pub fn into_records(self, table: &str) -> Vec<Record> {
        let header: Vec<String> = self.header.iter().map(|h| normalize_col_name(h)).collect();
        self.rows
            .into_iter()
            .map(|row| {
                let fields = header
                    .iter()
                    .enumerate()
                    .map(|(i, name)| FieldValue {
                        name: name.clone(),
                        value: row
                            .get(i)
                            .map(|cell| Value::String(cell.clone()))
                            .unwrap_or(Value::Null),
                    })
                    .collect();
                Record::new(table, fields)
            })
            .collect()
    }
}

/// External spreadsheet reader. Implementations live outside the engine;
/// the handlers only depend on this boundary.
#[async_trait]
pub trait SpreadsheetClient: Send + Sync {
    async fn fetch_grid(&self, sheet_id: &str) -> Result<SheetGrid, GridError>;
}
