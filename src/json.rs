//! JSON rendering of rows and entities.
//!
//! Non-finite floats have no JSON number form; they are written as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use crate::value::Row;
use sea_query::Value;
use serde_json::{Map, Number};
use std::borrow::Borrow;

fn float_to_json(v: f64) -> serde_json::Value {
    match Number::from_f64(v) {
        Some(n) => serde_json::Value::Number(n),
        None if v.is_nan() => serde_json::Value::String("NaN".to_string()),
        None if v.is_sign_positive() => serde_json::Value::String("Infinity".to_string()),
        None => serde_json::Value::String("-Infinity".to_string()),
    }
}

/// Convert a single column value
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Bool(Some(b)) => Json::Bool(*b),
        Value::TinyInt(Some(v)) => Json::from(*v),
        Value::SmallInt(Some(v)) => Json::from(*v),
        Value::Int(Some(v)) => Json::from(*v),
        Value::BigInt(Some(v)) => Json::from(*v),
        Value::TinyUnsigned(Some(v)) => Json::from(*v),
        Value::SmallUnsigned(Some(v)) => Json::from(*v),
        Value::Unsigned(Some(v)) => Json::from(*v),
        Value::BigUnsigned(Some(v)) => Json::from(*v),
        Value::Float(Some(v)) => float_to_json(f64::from(*v)),
        Value::Double(Some(v)) => float_to_json(*v),
        Value::String(Some(s)) => Json::String(s.clone()),
        Value::Char(Some(c)) => Json::String(c.to_string()),
        Value::Bytes(Some(b)) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Json(Some(j)) => {
            let j: &serde_json::Value = j.borrow();
            j.clone()
        }
        Value::ChronoDateTimeUtc(Some(dt)) => {
            let dt: &chrono::DateTime<chrono::Utc> = dt.borrow();
            Json::String(dt.to_rfc3339())
        }
        Value::ChronoDateTime(Some(dt)) => {
            let dt: &chrono::NaiveDateTime = dt.borrow();
            Json::String(dt.to_string())
        }
        Value::ChronoDate(Some(d)) => {
            let d: &chrono::NaiveDate = d.borrow();
            Json::String(d.to_string())
        }
        other if crate::value::is_null(other) => Json::Null,
        other => Json::String(format!("{other:?}")),
    }
}

/// Convert a whole row into a JSON object
#[must_use]
pub fn row_to_json(row: &Row) -> serde_json::Value {
    let map: Map<String, serde_json::Value> = row
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();
    serde_json::Value::Object(map)
}
