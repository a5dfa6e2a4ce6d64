//! Entity manager
//!
//! Binds a [`Connection`] to entity construction, queries and persistence.
//! Managers are cheap to clone and every entity keeps the manager that
//! produced it, so `entity.save()` writes through the same connection.

use crate::config::DatabaseConfig;
use crate::connection::Connection;
use crate::data_mapper::DataMapper;
use crate::entity::Entity;
use crate::error::OrmError;
use crate::key::Key;
use crate::mapper::{EntityMapper, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::query::statement::{key_condition, Ident};
use crate::query::EntityQuery;
use crate::transaction::{IsolationLevel, Transaction};
use once_cell::sync::Lazy;
use sea_query::{Asterisk, Expr, Query, Value};
use std::sync::{Arc, RwLock};

static DEFAULT_MANAGER: Lazy<RwLock<Option<EntityManager>>> = Lazy::new(|| RwLock::new(None));

/// Install the manager used by [`Entity::query`], [`Entity::find`] and the
/// other static entity operations, returning the previous one
pub fn set_default_manager(manager: EntityManager) -> Option<EntityManager> {
    let mut slot = DEFAULT_MANAGER
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    log::info!(target: "rowbound::connection", "default entity manager set ({:?})", manager.connection().backend());
    slot.replace(manager)
}

/// Remove the default manager
pub fn clear_default_manager() -> Option<EntityManager> {
    DEFAULT_MANAGER
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
}

/// Factory for entities and queries over one connection
///
/// # Example
///
/// ```no_run
/// # use rowbound::{Connection, DataMapper, Entity, EntityData, EntityManager};
/// # #[derive(EntityData)]
/// # #[columns(id: i64, name: String)]
/// # struct User { #[orm] orm: DataMapper }
/// # impl Entity for User {}
/// # fn main() -> Result<(), rowbound::OrmError> {
/// let em = EntityManager::new(Connection::connect("sqlite::memory:")?);
///
/// let mut user = em.create::<User>();
/// user.set_name("Emma".to_string())?;
/// em.save(&mut user)?;
///
/// let found = em.find::<User>(user.id()?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EntityManager {
    connection: Arc<Connection>,
}

impl EntityManager {
    pub fn new(connection: Connection) -> Self {
        Self::from_shared(Arc::new(connection))
    }

    pub fn from_shared(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// # Errors
    ///
    /// See [`Connection::connect`].
    pub fn connect(url: &str) -> Result<Self, OrmError> {
        Ok(Self::new(Connection::connect(url)?))
    }

    /// # Errors
    ///
    /// See [`Connection::from_config`].
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, OrmError> {
        Ok(Self::new(Connection::from_config(config)?))
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn shared_connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }

    /// The manager installed with [`set_default_manager`]
    ///
    /// # Errors
    ///
    /// `NoConnection` when none is installed.
    pub fn global() -> Result<EntityManager, OrmError> {
        DEFAULT_MANAGER
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or(OrmError::NoConnection)
    }

    pub fn mapper<T: Entity>(&self) -> Arc<EntityMapper> {
        EntityMapper::of::<T>()
    }

    /// New unsaved entity without columns
    pub fn create<T: Entity>(&self) -> T {
        T::from_data_mapper(DataMapper::fresh(self.clone(), self.mapper::<T>()))
    }

    /// New unsaved entity with columns set
    ///
    /// # Errors
    ///
    /// `Relation` when a name is a relation.
    pub fn create_with<T, I, K, V>(&self, columns: I) -> Result<T, OrmError>
    where
        T: Entity,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut entity = self.create::<T>();
        for (name, value) in columns {
            entity.orm_mut().set_column(name.as_ref(), value)?;
        }
        Ok(entity)
    }

    pub fn query<T: Entity>(&self) -> EntityQuery<T> {
        EntityQuery::new(self.clone(), self.mapper::<T>())
    }

    /// Entity by primary key, `None` when absent
    ///
    /// # Errors
    ///
    /// `InvalidKey` when the key does not fit the primary key,
    /// `Persistence` on database failure.
    pub fn find<T: Entity>(&self, key: impl Into<Key>) -> Result<Option<T>, OrmError> {
        self.query::<T>().find(key)
    }

    pub fn find_all<T, I, K>(&self, keys: I) -> Result<Vec<T>, OrmError>
    where
        T: Entity,
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.query::<T>().find_all(keys)
    }

    /// Insert a new entity or update the dirty columns of a persisted one
    ///
    /// Returns `false` when a persisted entity had nothing to write.
    /// Inserts read the stored row back, so generated keys and defaults are
    /// visible afterwards.
    ///
    /// # Errors
    ///
    /// `ReadOnlyViolation`, `Deleted`, or `Persistence` wrapping the driver
    /// error.
    pub fn save<T: Entity>(&self, entity: &mut T) -> Result<bool, OrmError> {
        let orm = entity.orm_mut();
        let mapper = Arc::clone(orm.mapper());
        if orm.is_read_only() {
            return Err(OrmError::ReadOnlyViolation(format!("save {}", mapper.name())));
        }
        if orm.is_deleted() {
            return Err(OrmError::Deleted);
        }
        let table = mapper.table_name();

        if orm.is_new() {
            let columns = orm.get_raw_columns();
            let mut names: Vec<Ident> = Vec::with_capacity(columns.len() + 2);
            let mut values: Vec<Expr> = Vec::with_capacity(columns.len() + 2);
            if mapper.uses_timestamps() {
                for column in [CREATED_AT, UPDATED_AT] {
                    if !columns.contains_key(column) {
                        names.push(Ident::new(column));
                        values.push(Expr::cust("CURRENT_TIMESTAMP"));
                    }
                }
            }
            for (name, value) in columns {
                names.push(Ident::new(name));
                values.push(Expr::val(value));
            }

            let mut insert = Query::insert();
            insert.into_table(Ident::new(table.as_str()));
            if names.is_empty() {
                insert.or_default_values();
            } else {
                insert
                    .columns(names)
                    .values(values)
                    .map_err(|e| OrmError::statement(e.to_string()))?;
            }
            insert.returning_col(Asterisk);

            let returned = self.connection.query_statement(insert)?.into_iter().next();
            orm.mark_inserted(returned);
            log::debug!(target: "rowbound::mapper", "inserted {}", mapper.name());
            return Ok(true);
        }

        let dirty = orm.dirty_values();
        if dirty.is_empty() {
            log::trace!(target: "rowbound::mapper", "{} has no changes to save", mapper.name());
            return Ok(false);
        }
        let key = orm.primary_key_values()?;

        let mut update = Query::update();
        update.table(Ident::new(table.as_str()));
        let touches_updated_at = dirty.iter().any(|(name, _)| name == UPDATED_AT);
        for (name, value) in dirty {
            update.value(Ident::new(name), value);
        }
        if mapper.uses_timestamps() && !touches_updated_at {
            update.value(Ident::new(UPDATED_AT), Expr::cust("CURRENT_TIMESTAMP"));
        }
        update.cond_where(key_condition(&table, mapper.primary_key_columns(), &[key]));

        let affected = self.connection.execute_statement(update)?;
        orm.mark_updated();
        log::debug!(
            target: "rowbound::mapper",
            "updated {} ({affected} row(s))",
            mapper.name()
        );
        Ok(affected > 0)
    }

    /// Delete one entity by primary key and mark it deleted
    ///
    /// Soft-delete entities get `deleted_at` set unless `force` is true.
    /// An unsaved entity is only marked deleted.
    ///
    /// # Errors
    ///
    /// `ReadOnlyViolation`, `Deleted` when already deleted, `InvalidKey`
    /// without a key, `Persistence` on database failure.
    pub fn delete<T: Entity>(&self, entity: &mut T, force: bool) -> Result<(), OrmError> {
        let orm = entity.orm_mut();
        let mapper = Arc::clone(orm.mapper());
        if orm.is_read_only() {
            return Err(OrmError::ReadOnlyViolation(format!("delete {}", mapper.name())));
        }
        if orm.is_deleted() {
            return Err(OrmError::Deleted);
        }
        if orm.is_new() {
            orm.mark_deleted();
            return Ok(());
        }

        let table = mapper.table_name();
        let condition = key_condition(&table, mapper.primary_key_columns(), &[orm.primary_key_values()?]);
        let soft = mapper.uses_soft_delete() && !force;
        if soft {
            let mut update = Query::update();
            update
                .table(Ident::new(table.as_str()))
                .value(Ident::new(DELETED_AT), Expr::cust("CURRENT_TIMESTAMP"))
                .cond_where(condition);
            self.connection.execute_statement(update)?;
        } else {
            let mut delete = Query::delete();
            delete.from_table(Ident::new(table.as_str())).cond_where(condition);
            self.connection.execute_statement(delete)?;
        }
        orm.mark_deleted();
        log::debug!(
            target: "rowbound::mapper",
            "{} {}",
            if soft { "soft-deleted" } else { "deleted" },
            mapper.name()
        );
        Ok(())
    }

    /// Run `f` inside a transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
    /// panics. Calls nest through savepoints.
    ///
    /// # Errors
    ///
    /// The error of `f`, or the failure to begin or commit.
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&EntityManager) -> Result<R, E>,
        E: From<OrmError>,
    {
        self.run_transaction(None, f)
    }

    /// [`EntityManager::transaction`] with an isolation level
    pub fn transaction_with<R, E, F>(&self, isolation: IsolationLevel, f: F) -> Result<R, E>
    where
        F: FnOnce(&EntityManager) -> Result<R, E>,
        E: From<OrmError>,
    {
        self.run_transaction(Some(isolation), f)
    }

    fn run_transaction<R, E, F>(&self, isolation: Option<IsolationLevel>, f: F) -> Result<R, E>
    where
        F: FnOnce(&EntityManager) -> Result<R, E>,
        E: From<OrmError>,
    {
        let tx = Transaction::begin(&self.connection, isolation)?;
        match f(self) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::warn!(target: "rowbound::connection", "rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_without_default_manager() {
        // Only this test touches the default manager inside the unit tests
        clear_default_manager();
        assert!(matches!(EntityManager::global(), Err(OrmError::NoConnection)));

        let em = EntityManager::new(Connection::sqlite_in_memory().unwrap());
        assert!(set_default_manager(em).is_none());
        assert!(EntityManager::global().is_ok());
        assert!(clear_default_manager().is_some());
    }

    #[test]
    fn test_transaction_commits_and_rolls_back() {
        let em = EntityManager::new(Connection::sqlite_in_memory().unwrap());
        em.connection()
            .execute_unprepared("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();

        em.transaction(|em| {
            em.connection().execute_unprepared("INSERT INTO t (id) VALUES (1)")?;
            Ok::<_, OrmError>(())
        })
        .unwrap();

        let result: Result<(), OrmError> = em.transaction(|em| {
            em.connection().execute_unprepared("INSERT INTO t (id) VALUES (2)")?;
            Err(OrmError::Unsupported("abort".to_string()))
        });
        assert!(result.is_err());

        let rows = em.connection().query("SELECT id FROM t", vec![]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
