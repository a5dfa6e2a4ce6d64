//! Executor abstraction over the database drivers.
//!
//! An [`Executor`] runs already-rendered SQL with `sea_query` parameter
//! values and returns rows as column maps. Everything above this layer
//! (connections, mappers, queries) is backend-agnostic; only statement
//! rendering asks which [`Backend`] it is talking to.

pub mod postgres;
pub mod sqlite;
pub mod value_conversion;

use crate::error::OrmError;
use crate::value::Row;
use sea_query::Values;

pub use postgres::PostgresExecutor;
pub use sqlite::SqliteExecutor;

/// SQL dialect spoken by an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgresql",
            Backend::Sqlite => "sqlite",
        }
    }
}

/// Trait for executing database operations
///
/// Implementations must be `Send` so a connection can be shared behind a
/// mutex by every entity fetched through it.
///
/// # Examples
///
/// ```no_run
/// use rowbound::executor::{Executor, SqliteExecutor};
/// use sea_query::Values;
///
/// # fn main() -> Result<(), rowbound::OrmError> {
/// let executor = SqliteExecutor::open_in_memory()?;
/// executor.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &Values(vec![]))?;
/// let rows = executor.query_all("SELECT id, name FROM users", &Values(vec![]))?;
/// assert!(rows.is_empty());
/// # Ok(())
/// # }
/// ```
pub trait Executor: Send {
    /// Dialect used to render statements for this executor
    fn backend(&self) -> Backend;

    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects the statement.
    fn execute(&self, sql: &str, values: &Values) -> Result<u64, OrmError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Persistence` if the driver rejects the query or a
    /// column cannot be decoded.
    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Row>, OrmError>;

    /// Execute a query and return the first row, if any
    ///
    /// # Errors
    ///
    /// Same as [`Executor::query_all`].
    fn query_first(&self, sql: &str, values: &Values) -> Result<Option<Row>, OrmError> {
        Ok(self.query_all(sql, values)?.into_iter().next())
    }
}
