use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use model::{
    core::{data_type::DataType, value::Value},
    records::row::{FieldValue, Record},
    schema::TableSchema,
};

/// Encodes an engine value as a driver parameter.
pub fn to_sql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Int(v) => mysql_async::Value::Int(*v),
        Value::Float(v) => mysql_async::Value::Double(*v),
        Value::String(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::Boolean(v) => mysql_async::Value::Int(i64::from(*v)),
        Value::Timestamp(v) => mysql_async::Value::Date(
            v.year() as u16,
            v.month() as u8,
            v.day() as u8,
            v.hour() as u8,
            v.minute() as u8,
            v.second() as u8,
            0,
        ),
        Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::Null => mysql_async::Value::NULL,
    }
}

/// Decodes a driver value, guided by the declared column type where the wire
/// representation is ambiguous (MySQL ships most text/json/decimal values as
/// bytes).
pub fn from_sql(value: mysql_async::Value, data_type: DataType) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Int(v) => match data_type {
            DataType::Boolean => Value::Boolean(v != 0),
            DataType::Float => Value::Float(v as f64),
            _ => Value::Int(v),
        },
        mysql_async::Value::UInt(v) => Value::Int(v as i64),
        mysql_async::Value::Float(v) => Value::Float(v as f64),
        mysql_async::Value::Double(v) => Value::Float(v),
        mysql_async::Value::Date(year, month, day, hour, minute, second, _micros) => {
            match NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).and_then(|d| {
                d.and_hms_opt(hour as u32, minute as u32, second as u32)
            }) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Null, // zero-date sentinel
            }
        }
        mysql_async::Value::Time(neg, days, hours, minutes, seconds, _micros) => {
            let sign = if neg { "-" } else { "" };
            Value::String(format!(
                "{sign}{}:{minutes:02}:{seconds:02}",
                days as u32 * 24 + hours as u32
            ))
        }
        mysql_async::Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            match data_type {
                DataType::Int => text.parse::<i64>().map(Value::Int).unwrap_or(Value::String(text)),
                DataType::Float => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::String(text)),
                DataType::Json => serde_json::from_str(&text)
                    .map(Value::Json)
                    .unwrap_or(Value::String(text)),
                DataType::Timestamp => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                    .map(Value::Timestamp)
                    .unwrap_or(Value::String(text)),
                _ => Value::String(text),
            }
        }
    }
}

/// Builds a record from a fetched row using the cached schema descriptor;
/// columns the schema does not know decode as strings.
pub fn record_from_row(table: &str, schema: &TableSchema, row: mysql_async::Row) -> Record {
    let columns = row.columns();
    let values = row.unwrap();

    let fields = columns
        .iter()
        .zip(values)
        .map(|(col, raw)| {
            let name = col.name_str().into_owned();
            let data_type = schema
                .column(&name)
                .map(|c| c.data_type)
                .unwrap_or(DataType::String);
            FieldValue {
                name,
                value: from_sql(raw, data_type),
            }
        })
        .collect();

    Record::new(table, fields)
}

/// Quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
