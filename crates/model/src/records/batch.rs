use crate::{core::value::Value, records::row::Record};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The set of primary keys already present in the target store for a task.
/// Loaded once before streaming; staleness is tolerated and resolved by the
/// upsert engine's conflict path.
pub type ExistingKeySet = HashSet<Value>;

/// An ordered, bounded group of records sharing a common shape, produced and
/// committed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub table: String,
    pub rows: Vec<Record>,
}

impl Batch {
    pub fn new(table: &str, rows: Vec<Record>) -> Self {
        Batch {
            table: table.to_string(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drops rows whose dedup-key value is already present in the target.
    /// Returns the number of rows filtered out.
    pub fn filter_existing(&mut self, key_field: &str, existing: &ExistingKeySet) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| match r.get(key_field) {
            Some(v) => !existing.contains(v),
            None => true,
        });
        before - self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::row::FieldValue;

    fn rec(id: &str) -> Record {
        Record::new(
            "videos",
            vec![FieldValue {
                name: "video_id".into(),
                value: Value::String(id.into()),
            }],
        )
    }

    #[test]
    fn filter_drops_only_existing_keys() {
        let existing: ExistingKeySet = [Value::String("a".into()), Value::String("b".into())]
            .into_iter()
            .collect();

        let mut batch = Batch::new("videos", vec![rec("a"), rec("c")]);
        let dropped = batch.filter_existing("video_id", &existing);

        assert_eq!(dropped, 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rows[0].value("video_id"), Value::String("c".into()));
    }

    #[test]
    fn rows_without_key_field_pass_through() {
        let existing: ExistingKeySet = [Value::String("a".into())].into_iter().collect();
        let mut batch = Batch::new("videos", vec![Record::new("videos", vec![])]);
        assert_eq!(batch.filter_existing("video_id", &existing), 0);
        assert_eq!(batch.len(), 1);
    }
}
