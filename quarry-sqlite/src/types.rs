//! Value conversion between Quarry and SQLite.

use rusqlite::types::{Value as SqliteValue, ValueRef};

use quarry_query::value::Value;

/// Convert a bound parameter to a SQLite value.
///
/// SQLite has no boolean or JSON storage class: booleans become integers,
/// JSON and lists become JSON text.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::List(_) => SqliteValue::Text(serde_json::to_string(value).unwrap_or_default()),
    }
}

/// Convert a column value read from SQLite.
///
/// Values come back in their storage class; the materializer coerces them
/// to the declared property kind.
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
