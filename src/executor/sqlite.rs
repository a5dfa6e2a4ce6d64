//! SQLite executor over `rusqlite`.
//!
//! SQLite is dynamically typed, so decoded values follow the storage
//! class: INTEGER becomes `BigInt`, REAL `Double`, TEXT `String`, BLOB
//! `Bytes`, NULL `String(None)`. [`crate::value::FromValue`] bridges those
//! to the declared Rust types.

use super::{Backend, Executor};
use crate::error::OrmError;
use crate::value::{null, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection as SqliteConnection, OpenFlags};
use sea_query::{Value, Values};
use std::borrow::Borrow;
use std::path::Path;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Executor backed by a `rusqlite::Connection`
pub struct SqliteExecutor {
    conn: SqliteConnection,
}

impl SqliteExecutor {
    #[must_use]
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::connect_span(Backend::Sqlite.name()).entered();

        Ok(Self::new(SqliteConnection::open_in_memory()?))
    }

    /// Open (creating if needed) a database file
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::connect_span(Backend::Sqlite.name()).entered();

        let path = path.as_ref();
        let conn = SqliteConnection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        log::info!(target: "rowbound::connection", "opened SQLite database {}", path.display());
        Ok(Self::new(conn))
    }
}

fn to_sqlite(value: &Value) -> Result<SqliteValue, OrmError> {
    let converted = match value {
        v if crate::value::is_null(v) => SqliteValue::Null,
        Value::Bool(Some(b)) => SqliteValue::Integer(i64::from(*b)),
        Value::TinyInt(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::SmallInt(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::BigInt(Some(v)) => SqliteValue::Integer(*v),
        Value::TinyUnsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::Unsigned(Some(v)) => SqliteValue::Integer(i64::from(*v)),
        Value::BigUnsigned(Some(u)) => SqliteValue::Integer(i64::try_from(*u).map_err(|_| {
            OrmError::statement(format!("BigUnsigned value {u} exceeds i64::MAX"))
        })?),
        Value::Float(Some(v)) => SqliteValue::Real(f64::from(*v)),
        Value::Double(Some(v)) => SqliteValue::Real(*v),
        Value::String(Some(s)) => SqliteValue::Text(s.clone()),
        Value::Char(Some(c)) => SqliteValue::Text(c.to_string()),
        Value::Bytes(Some(b)) => SqliteValue::Blob(b.clone()),
        Value::Json(Some(j)) => {
            let j: &serde_json::Value = j.borrow();
            SqliteValue::Text(j.to_string())
        }
        Value::ChronoDateTimeUtc(Some(dt)) => {
            let dt: &DateTime<Utc> = dt.borrow();
            SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        Value::ChronoDateTime(Some(dt)) => {
            let dt: &NaiveDateTime = dt.borrow();
            SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        Value::ChronoDate(Some(d)) => {
            let d: &NaiveDate = d.borrow();
            SqliteValue::Text(d.to_string())
        }
        other => {
            return Err(OrmError::statement(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(converted)
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => null(),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

fn bind(values: &Values) -> Result<Vec<SqliteValue>, OrmError> {
    values.iter().map(to_sqlite).collect()
}

impl Executor for SqliteExecutor {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn execute(&self, sql: &str, values: &Values) -> Result<u64, OrmError> {
        let params = bind(values)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Row>, OrmError> {
        let params = bind(values)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in names.iter().enumerate() {
                record.insert(name.clone(), from_sqlite(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}
