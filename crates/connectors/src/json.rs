use model::{
    core::value::Value,
    records::row::{FieldValue, Record},
};

/// Flattens a top-level JSON object into a record. Scalars map onto typed
/// values; nested objects and arrays stay structured as `Value::Json`.
/// Returns `None` for non-object input.
pub fn record_from_json(table: &str, json: &serde_json::Value) -> Option<Record> {
    let object = json.as_object()?;
    let fields = object
        .iter()
        .map(|(name, v)| FieldValue {
            name: name.clone(),
            value: value_from_json(v),
        })
        .collect();
    Some(Record::new(table, fields))
}

pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        nested => Value::Json(nested.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_map_to_typed_values() {
        let rec = record_from_json(
            "posts",
            &json!({"id": "p1", "likes": 3, "score": 0.5, "pinned": true, "tags": ["a"]}),
        )
        .unwrap();

        assert_eq!(rec.value("id"), Value::String("p1".into()));
        assert_eq!(rec.value("likes"), Value::Int(3));
        assert_eq!(rec.value("score"), Value::Float(0.5));
        assert_eq!(rec.value("pinned"), Value::Boolean(true));
        assert_eq!(rec.value("tags"), Value::Json(json!(["a"])));
    }

    #[test]
    fn non_object_yields_none() {
        assert!(record_from_json("posts", &json!([1, 2])).is_none());
        assert!(record_from_json("posts", &json!("str")).is_none());
    }
}
