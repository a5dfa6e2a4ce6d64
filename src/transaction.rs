//! Transactions
//!
//! A [`Transaction`] guard opens a transaction on a [`Connection`] and
//! closes it exactly once: `commit`, `rollback`, or a rollback when the
//! guard is dropped (early return or panic). Opening a guard while another
//! is active on the same connection creates a savepoint instead, so
//! transactions nest.
//!
//! Most code goes through [`EntityManager::transaction`](crate::EntityManager::transaction).

use crate::connection::Connection;
use crate::error::OrmError;
use crate::executor::Backend;
use std::sync::atomic::Ordering;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// PostgreSQL treats this as ReadCommitted
    ReadUncommitted,
    /// PostgreSQL default
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

fn savepoint(level: u32) -> String {
    format!("rowbound_sp_{level}")
}

/// Open transaction or savepoint on a connection
#[derive(Debug)]
pub struct Transaction<'a> {
    connection: &'a Connection,
    /// 0 for the outermost transaction, savepoint number otherwise
    level: u32,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Start a transaction, or a savepoint inside an open one
    ///
    /// The isolation level only applies to an outermost PostgreSQL
    /// transaction.
    ///
    /// # Errors
    ///
    /// `Persistence` when BEGIN / SAVEPOINT fails.
    pub fn begin(connection: &'a Connection, isolation: Option<IsolationLevel>) -> Result<Self, OrmError> {
        let depth = connection.transaction_depth();
        let level = depth.load(Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span(level).entered();

        let sql = match (level, connection.backend(), isolation) {
            (0, Backend::Postgres, Some(isolation)) => {
                format!("BEGIN ISOLATION LEVEL {}", isolation.to_sql())
            }
            (0, Backend::Sqlite, Some(isolation)) => {
                log::debug!(
                    target: "rowbound::connection",
                    "SQLite ignores isolation level {}",
                    isolation.to_sql()
                );
                "BEGIN".to_string()
            }
            (0, _, None) => "BEGIN".to_string(),
            (_, _, isolation) => {
                if let Some(isolation) = isolation {
                    log::debug!(
                        target: "rowbound::connection",
                        "isolation level {} ignored for nested transaction",
                        isolation.to_sql()
                    );
                }
                format!("SAVEPOINT {}", savepoint(level))
            }
        };
        connection.execute_unprepared(&sql)?;
        depth.store(level + 1, Ordering::SeqCst);
        log::trace!(target: "rowbound::connection", "transaction level {level} open");

        Ok(Self {
            connection,
            level,
            closed: false,
        })
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.level > 0
    }

    fn ensure_innermost(&self) -> Result<(), OrmError> {
        let depth = self.connection.transaction_depth().load(Ordering::SeqCst);
        if depth != self.level + 1 {
            return Err(OrmError::Transaction(format!(
                "transaction level {} closed while {} level(s) are open",
                self.level, depth
            )));
        }
        Ok(())
    }

    fn close(&mut self, sql: &str) -> Result<(), OrmError> {
        self.connection.execute_unprepared(sql)?;
        self.closed = true;
        self.connection
            .transaction_depth()
            .store(self.level, Ordering::SeqCst);
        Ok(())
    }

    /// Commit, or release the savepoint
    ///
    /// # Errors
    ///
    /// `Transaction` while a nested transaction is still open,
    /// `Persistence` when the statement fails (the guard then rolls back
    /// on drop).
    pub fn commit(mut self) -> Result<(), OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span(self.level).entered();

        self.ensure_innermost()?;
        let sql = if self.level == 0 {
            "COMMIT".to_string()
        } else {
            format!("RELEASE SAVEPOINT {}", savepoint(self.level))
        };
        self.close(&sql)
    }

    /// Roll back, or roll back to the savepoint
    ///
    /// Nested transactions still open are rolled back with it.
    pub fn rollback(mut self) -> Result<(), OrmError> {
        self.rollback_in_place()
    }

    fn rollback_in_place(&mut self) -> Result<(), OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span(self.level).entered();

        if self.connection.transaction_depth().load(Ordering::SeqCst) <= self.level {
            self.closed = true;
            return Err(OrmError::Transaction(format!(
                "transaction level {} was already closed by an outer transaction",
                self.level
            )));
        }
        if self.level == 0 {
            self.close("ROLLBACK")
        } else {
            let name = savepoint(self.level);
            self.close(&format!("ROLLBACK TO SAVEPOINT {name}"))?;
            // ROLLBACK TO keeps the savepoint open
            self.connection
                .execute_unprepared(&format!("RELEASE SAVEPOINT {name}"))?;
            Ok(())
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let depth = self.connection.transaction_depth().load(Ordering::SeqCst);
        if self.closed || depth <= self.level {
            return;
        }
        log::debug!(
            target: "rowbound::connection",
            "transaction level {} dropped while open, rolling back",
            self.level
        );
        if let Err(e) = self.rollback_in_place() {
            log::warn!(
                target: "rowbound::connection",
                "rollback of transaction level {} failed: {e}",
                self.level
            );
            self.connection
                .transaction_depth()
                .store(self.level, Ordering::SeqCst);
        }
    }
}
