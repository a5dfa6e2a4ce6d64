//! PostgreSQL executor over `may_postgres`.
//!
//! Connecting is a blocking call that also works inside may coroutines.
//! Result columns are decoded by their PostgreSQL type name into
//! `sea_query::Value`; types without a mapping are an error rather than a
//! silent NULL.

use super::value_conversion::with_converted_params;
use super::{Backend, Executor};
use crate::error::OrmError;
use crate::value::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use may_postgres::Client;
use sea_query::{Value, Values};
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Reject PostgreSQL targets that cannot name a server
///
/// URLs need a host after the scheme; key-value strings need every word
/// to be `key=value`.
///
/// # Errors
///
/// `OrmError::Connection` naming the malformed part.
pub fn check_target(target: &str) -> Result<(), OrmError> {
    let bad = |reason: &str| -> Result<(), OrmError> {
        Err(OrmError::Connection(format!("{reason}: {target:?}")))
    };

    if let Some(rest) = target
        .strip_prefix("postgres://")
        .or_else(|| target.strip_prefix("postgresql://"))
    {
        let authority = rest.split(['/', '?']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return bad("PostgreSQL URL has no host");
        }
        return Ok(());
    }

    if target.split_whitespace().next().is_none() {
        return bad("empty connection string");
    }
    if target.contains("://") {
        return bad("unsupported URL scheme");
    }
    for word in target.split_whitespace() {
        match word.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => return bad(&format!("expected key=value, found {word:?}")),
        }
    }
    Ok(())
}

/// Executor backed by a single `may_postgres::Client`
pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Establish a connection
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Connection` for a malformed connection string and
    /// `OrmError::Persistence` if the server cannot be reached.
    pub fn connect(connection_string: &str) -> Result<Self, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::connect_span(Backend::Postgres.name()).entered();

        check_target(connection_string)?;
        let start = Instant::now();
        let client = may_postgres::connect(connection_string)?;
        log::info!(target: "rowbound::connection", "connected to PostgreSQL in {:?}", start.elapsed());
        Ok(Self::new(client))
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn decode_row(row: &may_postgres::Row) -> Result<Row, OrmError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "bool" => Value::from(row.try_get::<_, Option<bool>>(idx)?),
            "int2" => Value::from(row.try_get::<_, Option<i16>>(idx)?),
            "int4" => Value::from(row.try_get::<_, Option<i32>>(idx)?),
            "int8" => Value::from(row.try_get::<_, Option<i64>>(idx)?),
            "float4" => Value::from(row.try_get::<_, Option<f32>>(idx)?),
            "float8" => Value::from(row.try_get::<_, Option<f64>>(idx)?),
            "text" | "varchar" | "bpchar" | "name" | "citext" => {
                Value::from(row.try_get::<_, Option<String>>(idx)?)
            }
            "bytea" => Value::from(row.try_get::<_, Option<Vec<u8>>>(idx)?),
            "json" | "jsonb" => Value::from(row.try_get::<_, Option<serde_json::Value>>(idx)?),
            "timestamptz" => Value::from(row.try_get::<_, Option<DateTime<Utc>>>(idx)?),
            "timestamp" => Value::from(row.try_get::<_, Option<NaiveDateTime>>(idx)?),
            "date" => Value::from(row.try_get::<_, Option<NaiveDate>>(idx)?),
            other => {
                return Err(OrmError::statement(format!(
                    "Cannot decode column {} of PostgreSQL type {}",
                    column.name(),
                    other
                )))
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

impl Executor for PostgresExecutor {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn execute(&self, sql: &str, values: &Values) -> Result<u64, OrmError> {
        with_converted_params(values, |params| Ok(self.client.execute(sql, params)?))
    }

    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Row>, OrmError> {
        with_converted_params(values, |params| {
            let rows = self.client.query(sql, params)?;
            rows.iter().map(decode_row).collect()
        })
    }
}
