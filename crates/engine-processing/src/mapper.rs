use chrono::{NaiveDate, NaiveDateTime};
use model::{
    core::{data_type::DataType, value::Value},
    records::batch::Batch,
    schema::TableSchema,
};

const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Strings made only of digits, dots and spaces stay as they are; the target
/// column type decides what they mean.
fn numeric_looking(raw: &str) -> bool {
    !raw.is_empty()
        && raw.chars().any(|c| c.is_ascii_digit())
        && raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ' ')
}

#[derive(Clone, Copy, PartialEq)]
enum Promotion {
    Keep,
    Timestamp,
    Json,
}

/// What a column's first non-null sample says about the whole column. Only
/// string samples are sniffed; typed values already carry their shape.
fn sniff_sample(sample: &Value) -> Promotion {
    let Value::String(raw) = sample else {
        return Promotion::Keep;
    };
    if numeric_looking(raw) {
        return Promotion::Keep;
    }
    if parse_timestamp(raw).is_some() {
        return Promotion::Timestamp;
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(parsed) if parsed.is_object() || parsed.is_array() => Promotion::Json,
        _ => Promotion::Keep,
    }
}

/// Infers column types for untyped (file and spreadsheet) sources from each
/// column's first non-null value, then converts the column accordingly.
/// Values that disagree with the sampled shape become null; the sample is
/// trusted for the whole batch.
pub fn sniff_columns(mut batch: Batch) -> Batch {
    let Some(first) = batch.rows.first() else {
        return batch;
    };
    let columns: Vec<String> = first.fields.iter().map(|f| f.name.clone()).collect();

    for col in &columns {
        let sample = batch
            .rows
            .iter()
            .find_map(|r| r.get(col).filter(|v| !v.is_null()));
        let promotion = match sample {
            Some(v) => sniff_sample(v),
            None => Promotion::Keep,
        };
        if promotion == Promotion::Keep {
            continue;
        }

        for row in &mut batch.rows {
            let Some(Value::String(raw)) = row.get(col).cloned() else {
                continue;
            };
            let converted = match promotion {
                Promotion::Timestamp => parse_timestamp(&raw)
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Null),
                Promotion::Json => serde_json::from_str(&raw)
                    .map(Value::Json)
                    .unwrap_or(Value::String(raw)),
                Promotion::Keep => unreachable!(),
            };
            row.set(col, converted);
        }
    }
    batch
}

/// Shapes a batch for the target table: timestamps render in the canonical
/// DATETIME format and nulls in numeric columns default to zero, so bulk
/// statements never trip over NULL arithmetic downstream.
pub fn format_batch(mut batch: Batch, schema: &TableSchema) -> Batch {
    for row in &mut batch.rows {
        for field in &mut row.fields {
            match &field.value {
                Value::Timestamp(ts) => {
                    field.value = Value::String(
                        ts.format(model::core::value::TIMESTAMP_FORMAT).to_string(),
                    );
                }
                Value::Null => {
                    if let Some(col) = schema.column(&field.name) {
                        match col.data_type {
                            DataType::Int => field.value = Value::Int(0),
                            DataType::Float => field.value = Value::Float(0.0),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        records::row::{FieldValue, Record},
        schema::ColumnDef,
    };
    use serde_json::json;

    fn rec(fields: Vec<(&str, Value)>) -> Record {
        Record::new(
            "videos",
            fields
                .into_iter()
                .map(|(name, value)| FieldValue {
                    name: name.into(),
                    value,
                })
                .collect(),
        )
    }

    #[test]
    fn date_strings_promote_to_timestamps() {
        let batch = Batch::new(
            "videos",
            vec![
                rec(vec![("published_at", Value::String("2023-04-05".into()))]),
                rec(vec![("published_at", Value::String("2023-04-06T10:00:00".into()))]),
            ],
        );

        let sniffed = sniff_columns(batch);
        assert!(matches!(
            sniffed.rows[0].value("published_at"),
            Value::Timestamp(_)
        ));
        assert!(matches!(
            sniffed.rows[1].value("published_at"),
            Value::Timestamp(_)
        ));
    }

    #[test]
    fn numeric_looking_strings_are_left_alone() {
        // "20230405" could parse as a date; the digit guard keeps it a string.
        let batch = Batch::new(
            "videos",
            vec![rec(vec![("views", Value::String("20230405".into()))])],
        );

        let sniffed = sniff_columns(batch);
        assert_eq!(sniffed.rows[0].value("views"), Value::String("20230405".into()));
    }

    #[test]
    fn json_strings_promote_to_structured_values() {
        let batch = Batch::new(
            "posts",
            vec![rec(vec![(
                "tags",
                Value::String("[\"news\",\"health\"]".into()),
            )])],
        );

        let sniffed = sniff_columns(batch);
        assert_eq!(
            sniffed.rows[0].value("tags"),
            Value::Json(json!(["news", "health"]))
        );
    }

    #[test]
    fn mixed_column_downstream_of_a_date_sample_goes_null() {
        let batch = Batch::new(
            "videos",
            vec![
                rec(vec![("published_at", Value::String("2023-04-05".into()))]),
                rec(vec![("published_at", Value::String("not a date".into()))]),
            ],
        );

        let sniffed = sniff_columns(batch);
        assert_eq!(sniffed.rows[1].value("published_at"), Value::Null);
    }

    #[test]
    fn format_renders_timestamps_and_defaults_numeric_nulls() {
        let schema = TableSchema::new(
            "videos",
            vec![
                ColumnDef::new("video_id", DataType::String, false),
                ColumnDef::new("views", DataType::Int, true),
                ColumnDef::new("rating", DataType::Float, true),
                ColumnDef::new("title", DataType::String, true),
                ColumnDef::new("published_at", DataType::Timestamp, true),
            ],
            vec!["video_id".to_string()],
        );
        let ts = NaiveDate::from_ymd_opt(2023, 4, 5)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        let batch = Batch::new(
            "videos",
            vec![rec(vec![
                ("video_id", Value::String("a".into())),
                ("views", Value::Null),
                ("rating", Value::Null),
                ("title", Value::Null),
                ("published_at", Value::Timestamp(ts)),
            ])],
        );

        let formatted = format_batch(batch, &schema);
        let row = &formatted.rows[0];
        assert_eq!(row.value("views"), Value::Int(0));
        assert_eq!(row.value("rating"), Value::Float(0.0));
        assert_eq!(row.value("title"), Value::Null);
        assert_eq!(
            row.value("published_at"),
            Value::String("2023-04-05 07:30:00".into())
        );
    }
}
