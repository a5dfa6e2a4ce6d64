//! Value conversion utilities for SeaQuery to may_postgres.
//!
//! Each `sea_query::Value` is boxed into an owned `ToSql` parameter, then the
//! closure receives borrowed trait objects. The boxes live for the whole
//! closure call, so the references stay valid while the statement runs.
//!
//! NULLs keep their Rust type (`Option<String>`, `Option<i64>`, ...) so the
//! server-side type check sees a compatible parameter type.

use crate::error::OrmError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use may_postgres::types::ToSql;
use sea_query::Value;
use std::borrow::Borrow;

fn to_param(value: &Value) -> Result<Box<dyn ToSql>, OrmError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(Some(u)) => {
            let v = i64::try_from(*u).map_err(|_| {
                OrmError::statement(format!(
                    "BigUnsigned value {} exceeds i64::MAX ({}), cannot be safely cast to i64",
                    u,
                    i64::MAX
                ))
            })?;
            Box::new(Some(v))
        }
        Value::BigUnsigned(None) => Box::new(None::<i64>),
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Json(v) => Box::new(v.as_ref().map(|j| {
            let j: &serde_json::Value = j.borrow();
            j.clone()
        })),
        Value::ChronoDateTimeUtc(v) => Box::new(v.as_ref().map(|dt| {
            let dt: &DateTime<Utc> = dt.borrow();
            *dt
        })),
        Value::ChronoDateTime(v) => Box::new(v.as_ref().map(|dt| {
            let dt: &NaiveDateTime = dt.borrow();
            *dt
        })),
        Value::ChronoDate(v) => Box::new(v.as_ref().map(|d| {
            let d: &NaiveDate = d.borrow();
            *d
        })),
        other => {
            return Err(OrmError::statement(format!(
                "Unsupported value type in query: {other:?}"
            )));
        }
    };
    Ok(param)
}

/// Convert SeaQuery values to may_postgres `ToSql` parameters and run `f`
/// with them.
///
/// # Errors
///
/// Returns `OrmError::Persistence` if an unsupported value type is
/// encountered, or whatever `f` returns.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, OrmError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, OrmError>,
{
    let owned = values
        .iter()
        .map(to_param)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(AsRef::as_ref).collect();
    f(&params)
}
