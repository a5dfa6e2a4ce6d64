//! Error types shared by every layer of the mapper.
//!
//! `OrmError` is the single error type returned by public operations.
//! Driver failures are wrapped in [`DriverError`] and surface as
//! [`OrmError::Persistence`]; they are never retried.

use thiserror::Error;

/// Failure reported by the underlying database driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// `PostgreSQL` error from `may_postgres`
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),
    /// SQLite error from `rusqlite`
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Statement could not be built or parameters could not be bound
    #[error("{0}")]
    Other(String),
}

/// Errors raised by entities, mappers, queries and connections
#[derive(Debug, Error)]
pub enum OrmError {
    /// Neither a column nor a relation exists under this name
    #[error("Unknown column or relation: {0}")]
    UnknownColumn(String),
    /// Mutation attempted on an entity fetched as read-only
    #[error("Entity is read-only, cannot modify {0}")]
    ReadOnlyViolation(String),
    /// Primary-key column changed after the row was persisted
    #[error("Primary key column {0} cannot be changed once the record is persisted")]
    ImmutableKeyViolation(String),
    /// Column access after the entity was deleted
    #[error("The record was deleted")]
    Deleted,
    /// Key value does not match the primary-key shape of the entity
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// Stored value cannot be converted to the requested Rust type
    #[error("Type mismatch for column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    /// Relation misuse or misconfiguration
    #[error("Relation error: {0}")]
    Relation(String),
    /// Driver-level failure (constraint violation, connection loss, ...)
    #[error("Persistence error: {0}")]
    Persistence(#[from] DriverError),
    /// Operation the backend dialects cannot express
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Static entity helpers used before a default manager was installed
    #[error("No default entity manager has been configured")]
    NoConnection,
    /// Connection string or connection state problem
    #[error("Connection error: {0}")]
    Connection(String),
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    /// Transaction already closed or savepoint bookkeeping failed
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl From<may_postgres::Error> for OrmError {
    fn from(err: may_postgres::Error) -> Self {
        OrmError::Persistence(DriverError::Postgres(err))
    }
}

impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        OrmError::Persistence(DriverError::Sqlite(err))
    }
}

impl OrmError {
    /// True for failures coming from the database driver
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, OrmError::Persistence(_))
    }

    pub(crate) fn statement(msg: impl Into<String>) -> Self {
        OrmError::Persistence(DriverError::Other(msg.into()))
    }
}
