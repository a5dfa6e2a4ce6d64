//! Connection handle shared by an entity manager and every entity it yields.
//!
//! A `Connection` owns one executor behind a mutex, renders statements for
//! the executor's dialect, and records every statement it runs: a
//! `log::debug!` line on target `rowbound::query`, a tracing span with the
//! `tracing` feature, counters with the `metrics` feature, and an
//! in-memory query log when [`Connection::log_queries`] is on.

use crate::config::DatabaseConfig;
use crate::error::OrmError;
use crate::executor::{Backend, Executor, PostgresExecutor, SqliteExecutor};
use crate::query::Statement;
use crate::value::Row;
use sea_query::{Value, Values};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{LockResult, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// One statement captured by the query log
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Where a connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Postgres(String),
    SqliteMemory,
    SqliteFile(String),
}

impl ConnectionTarget {
    /// Classify a connection string
    ///
    /// - `postgres://`, `postgresql://` and `host=... dbname=...` go to PostgreSQL
    /// - `sqlite::memory:` and `:memory:` open an in-memory SQLite database
    /// - `sqlite://path` and `sqlite:path` open a SQLite file
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Connection` for anything else.
    pub fn parse(url: &str) -> Result<Self, OrmError> {
        let url = url.trim();
        if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return Ok(ConnectionTarget::SqliteMemory);
        }
        if let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
            if path.is_empty() {
                return Err(OrmError::Connection("SQLite connection string has no path".to_string()));
            }
            return Ok(ConnectionTarget::SqliteFile(path.to_string()));
        }
        crate::executor::postgres::check_target(url)?;
        Ok(ConnectionTarget::Postgres(url.to_string()))
    }
}

/// Shared database connection
pub struct Connection {
    executor: Mutex<Box<dyn Executor>>,
    backend: Backend,
    logging: AtomicBool,
    log: Mutex<Vec<LoggedQuery>>,
    depth: AtomicU32,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("logging", &self.logging.load(Ordering::Relaxed))
            .field("depth", &self.depth.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn relock<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    pub fn new(executor: impl Executor + 'static) -> Self {
        let backend = executor.backend();
        Self {
            executor: Mutex::new(Box::new(executor)),
            backend,
            logging: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            depth: AtomicU32::new(0),
        }
    }

    /// Connect using a connection string, see [`ConnectionTarget::parse`]
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Connection` for an unrecognised string or
    /// `OrmError::Persistence` if the driver fails to connect.
    pub fn connect(url: &str) -> Result<Self, OrmError> {
        match ConnectionTarget::parse(url)? {
            ConnectionTarget::Postgres(url) => Ok(Self::new(PostgresExecutor::connect(&url)?)),
            ConnectionTarget::SqliteMemory => Ok(Self::new(SqliteExecutor::open_in_memory()?)),
            ConnectionTarget::SqliteFile(path) => Ok(Self::new(SqliteExecutor::open(path)?)),
        }
    }

    /// Connect from loaded configuration
    ///
    /// # Errors
    ///
    /// Same as [`Connection::connect`].
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, OrmError> {
        let connection = Self::connect(&config.url)?;
        connection.log_queries(config.log_queries);
        Ok(connection)
    }

    /// Private in-memory SQLite database
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if SQLite cannot allocate it.
    pub fn sqlite_in_memory() -> Result<Self, OrmError> {
        Ok(Self::new(SqliteExecutor::open_in_memory()?))
    }

    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Turn the in-memory query log on or off
    pub fn log_queries(&self, enabled: bool) {
        self.logging.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn query_log(&self) -> Vec<LoggedQuery> {
        relock(self.log.lock()).clone()
    }

    pub fn clear_query_log(&self) {
        relock(self.log.lock()).clear();
    }

    /// Run raw SQL without parameters
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects it.
    pub fn execute_unprepared(&self, sql: &str) -> Result<u64, OrmError> {
        let values = Values(Vec::new());
        self.run(sql, &values, |executor| executor.execute(sql, &values))
    }

    /// Run a raw query with positional parameters
    ///
    /// Placeholders follow the backend: `$1` for PostgreSQL, `?` for SQLite.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects it.
    pub fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, OrmError> {
        let values = Values(params);
        self.run(sql, &values, |executor| executor.query_all(sql, &values))
    }

    /// Render and execute a statement, returning the affected row count
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects it.
    pub fn execute_statement(&self, statement: impl Into<Statement>) -> Result<u64, OrmError> {
        let (sql, values) = statement.into().build(self.backend);
        self.run(&sql, &values, |executor| executor.execute(&sql, &values))
    }

    /// Render and execute a statement, returning its rows
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects it.
    pub fn query_statement(&self, statement: impl Into<Statement>) -> Result<Vec<Row>, OrmError> {
        let (sql, values) = statement.into().build(self.backend);
        self.run(&sql, &values, |executor| executor.query_all(&sql, &values))
    }

    pub(crate) fn transaction_depth(&self) -> &AtomicU32 {
        &self.depth
    }

    fn run<R>(
        &self,
        sql: &str,
        values: &Values,
        f: impl FnOnce(&dyn Executor) -> Result<R, OrmError>,
    ) -> Result<R, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        if self.logging.load(Ordering::Relaxed) {
            relock(self.log.lock()).push(LoggedQuery {
                sql: sql.to_string(),
                values: values.iter().cloned().collect(),
            });
        }

        let start = Instant::now();
        let result = {
            let executor = self
                .executor
                .lock()
                .map_err(|_| OrmError::Connection("executor mutex poisoned".to_string()))?;
            f(&**executor)
        };
        let elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        {
            METRICS.record_query(elapsed);
            if result.is_err() {
                METRICS.record_query_error();
            }
        }

        match &result {
            Ok(_) => log::debug!(target: "rowbound::query", "{sql} ({elapsed:?})"),
            Err(e) => log::warn!(target: "rowbound::query", "{sql} failed after {elapsed:?}: {e}"),
        }
        result
    }
}
