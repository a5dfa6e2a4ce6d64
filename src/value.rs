//! Column values and their conversion into Rust types.
//!
//! Rows are kept as `sea_query::Value` maps so the same entity code runs on
//! every backend. SQLite hands back integers for booleans and text for
//! timestamps, so [`FromValue`] accepts those shapes as well as the native
//! PostgreSQL ones.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sea_query::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use thiserror::Error;

/// A fetched row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Error type for value extraction failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueExtractionError {
    /// The value is SQL NULL
    #[error("Value is null")]
    NullValue,
    /// The value type doesn't match the expected type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    /// Value conversion failed (overflow, invalid format)
    #[error("Conversion error: {0}")]
    ConversionError(String),
}

/// The value used for SQL NULL when the column type is unknown
#[must_use]
pub fn null() -> Value {
    Value::String(None)
}

/// True when the value is SQL NULL, whatever its variant
#[must_use]
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
    )
}

fn mismatch(expected: &str, value: &Value) -> ValueExtractionError {
    ValueExtractionError::TypeMismatch {
        expected: expected.to_string(),
        actual: format!("{value:?}"),
    }
}

/// Integer view of any integral variant
fn as_i64(value: &Value) -> Option<Result<i64, ValueExtractionError>> {
    let v = match value {
        Value::TinyInt(Some(v)) => i64::from(*v),
        Value::SmallInt(Some(v)) => i64::from(*v),
        Value::Int(Some(v)) => i64::from(*v),
        Value::BigInt(Some(v)) => *v,
        Value::TinyUnsigned(Some(v)) => i64::from(*v),
        Value::SmallUnsigned(Some(v)) => i64::from(*v),
        Value::Unsigned(Some(v)) => i64::from(*v),
        Value::BigUnsigned(Some(v)) => {
            return Some(i64::try_from(*v).map_err(|_| {
                ValueExtractionError::ConversionError(format!("{v} exceeds i64::MAX"))
            }))
        }
        _ => return None,
    };
    Some(Ok(v))
}

/// Conversion from a stored column value
///
/// ```rust
/// use rowbound::value::{FromValue, ValueExtractionError};
/// use sea_query::Value;
///
/// assert_eq!(i32::from_value(Value::BigInt(Some(42))), Ok(42));
/// assert_eq!(Option::<i32>::from_value(Value::String(None)), Ok(None));
/// assert!(matches!(i32::from_value(Value::Int(None)), Err(ValueExtractionError::NullValue)));
/// ```
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        if is_null(&value) {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

macro_rules! impl_from_value_int {
    ($type:ty, $expected:expr) => {
        impl FromValue for $type {
            fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
                if is_null(&value) {
                    return Err(ValueExtractionError::NullValue);
                }
                match as_i64(&value) {
                    Some(v) => {
                        let v = v?;
                        <$type>::try_from(v).map_err(|_| {
                            ValueExtractionError::ConversionError(format!(
                                "{} out of range for {}",
                                v, $expected
                            ))
                        })
                    }
                    None => Err(mismatch($expected, &value)),
                }
            }
        }
    };
}

impl_from_value_int!(i8, "i8");
impl_from_value_int!(i16, "i16");
impl_from_value_int!(i32, "i32");
impl_from_value_int!(i64, "i64");
impl_from_value_int!(u8, "u8");
impl_from_value_int!(u16, "u16");
impl_from_value_int!(u32, "u32");

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::BigUnsigned(Some(v)) => Ok(v),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => match as_i64(&other) {
                Some(v) => u64::try_from(v?).map_err(|_| {
                    ValueExtractionError::ConversionError("negative value for u64".to_string())
                }),
                None => Err(mismatch("u64", &other)),
            },
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Double(Some(v)) => Ok(v),
            Value::Float(Some(v)) => Ok(f64::from(v)),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            #[allow(clippy::cast_precision_loss)]
            other => match as_i64(&other) {
                Some(v) => Ok(v? as f64),
                None => Err(mismatch("f64", &other)),
            },
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Float(Some(v)) => Ok(v),
            #[allow(clippy::cast_possible_truncation)]
            other => f64::from_value(other).map(|v| v as f32),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Bool(Some(v)) => Ok(v),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            // SQLite stores booleans as 0/1
            other => match as_i64(&other) {
                Some(v) => Ok(v? != 0),
                None => Err(mismatch("bool", &other)),
            },
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::String(Some(s)) => Ok(s),
            Value::Char(Some(c)) => Ok(c.to_string()),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Bytes(Some(b)) => Ok(b),
            Value::String(Some(s)) => Ok(s.into_bytes()),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => Err(mismatch("Bytes", &other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Json(Some(j)) => {
                let j: &serde_json::Value = j.borrow();
                Ok(j.clone())
            }
            // SQLite keeps JSON documents as text
            Value::String(Some(s)) => serde_json::from_str(&s)
                .map_err(|e| ValueExtractionError::ConversionError(format!("invalid JSON: {e}"))),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => Err(mismatch("Json", &other)),
        }
    }
}

const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, ValueExtractionError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, SQLITE_TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| ValueExtractionError::ConversionError(format!("invalid timestamp {text:?}: {e}")))
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::ChronoDateTime(Some(dt)) => {
                let dt: &NaiveDateTime = dt.borrow();
                Ok(*dt)
            }
            Value::ChronoDateTimeUtc(Some(dt)) => {
                let dt: &DateTime<Utc> = dt.borrow();
                Ok(dt.naive_utc())
            }
            Value::String(Some(s)) => parse_timestamp(&s),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => Err(mismatch("NaiveDateTime", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::ChronoDateTimeUtc(Some(dt)) => {
                let dt: &DateTime<Utc> = dt.borrow();
                Ok(*dt)
            }
            other => NaiveDateTime::from_value(other).map(|naive| Utc.from_utc_datetime(&naive)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::ChronoDate(Some(d)) => {
                let d: &NaiveDate = d.borrow();
                Ok(*d)
            }
            Value::String(Some(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| ValueExtractionError::ConversionError(format!("invalid date {s:?}: {e}"))),
            ref other if is_null(other) => Err(ValueExtractionError::NullValue),
            other => Err(mismatch("NaiveDate", &other)),
        }
    }
}

/// Backend-neutral, hashable form of a key component.
///
/// Used to match foreign keys against owner keys: an `Int(1)` bound by the
/// caller must equal the `BigInt(1)` SQLite returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum KeyPart {
    Null,
    Int(i64),
    Unsigned(u64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl KeyPart {
    pub(crate) fn of(value: &Value) -> Self {
        if is_null(value) {
            return KeyPart::Null;
        }
        if let Some(Ok(v)) = as_i64(value) {
            return KeyPart::Int(v);
        }
        match value {
            Value::BigUnsigned(Some(v)) => KeyPart::Unsigned(*v),
            Value::Bool(Some(b)) => KeyPart::Int(i64::from(*b)),
            Value::String(Some(s)) => KeyPart::Text(s.clone()),
            Value::Char(Some(c)) => KeyPart::Text(c.to_string()),
            Value::Bytes(Some(b)) => KeyPart::Bytes(b.clone()),
            Value::Double(Some(d)) => KeyPart::Text(d.to_string()),
            Value::Float(Some(f)) => KeyPart::Text(f.to_string()),
            other => KeyPart::Text(crate::json::value_to_json(other).to_string()),
        }
    }

    pub(crate) fn tuple(values: &[Value]) -> Vec<KeyPart> {
        values.iter().map(KeyPart::of).collect()
    }

    pub(crate) fn is_null(&self) -> bool {
        matches!(self, KeyPart::Null)
    }
}
