//! Execution methods for [`EntityQuery`].

use crate::data_mapper::DataMapper;
use crate::entity::Entity;
use crate::error::OrmError;
use crate::key::Key;
use crate::mapper::{DELETED_AT, UPDATED_AT};
use crate::query::select::EntityQuery;
use crate::query::statement::{key_condition, Ident};
use crate::relation::eager;
use crate::value::FromValue;
use sea_query::{Asterisk, Expr, ExprTrait, Func, Query, Value};
use std::sync::Arc;

const AGGREGATE: &str = "aggregate";

impl<T: Entity> EntityQuery<T> {
    fn fetch(&self, columns: &[&str]) -> Result<Vec<DataMapper>, OrmError> {
        let rows = self
            .manager
            .connection()
            .query_statement(self.select_statement(columns))?;
        let mappers: Vec<DataMapper> = rows
            .into_iter()
            .map(|row| {
                DataMapper::hydrate(self.manager.clone(), Arc::clone(&self.mapper), row, self.read_only)
            })
            .collect();
        log::debug!(
            target: "rowbound::query",
            "fetched {} {} row(s)",
            mappers.len(),
            self.mapper.name()
        );
        eager::preload(&self.manager, &self.mapper, &mappers, &self.eager)?;
        Ok(mappers)
    }

    /// Every matching entity
    ///
    /// `columns` limits the selected columns (empty selects all); the
    /// primary key is always included and other columns are read on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` on database failure, or a relation error for
    /// an unknown eager-load name.
    pub fn all(self, columns: &[&str]) -> Result<Vec<T>, OrmError> {
        Ok(self.fetch(columns)?.into_iter().map(T::from_data_mapper).collect())
    }

    /// The first matching entity, if any
    pub fn get(self, columns: &[&str]) -> Result<Option<T>, OrmError> {
        Ok(self.limit(1).all(columns)?.into_iter().next())
    }

    /// Entity by primary key
    ///
    /// # Errors
    ///
    /// `InvalidKey` when the key does not fit the primary key.
    pub fn find(self, key: impl Into<Key>) -> Result<Option<T>, OrmError> {
        let key = key.into().resolve(self.mapper.primary_key_columns())?;
        let condition = key_condition(
            &self.mapper.table_name(),
            self.mapper.primary_key_columns(),
            &[key],
        );
        self.filter(condition).get(&[])
    }

    /// Entities for several primary keys; missing keys are skipped
    pub fn find_all<I, K>(self, keys: I) -> Result<Vec<T>, OrmError>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let keys = keys
            .into_iter()
            .map(|key| key.into().resolve(self.mapper.primary_key_columns()))
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let condition = key_condition(
            &self.mapper.table_name(),
            self.mapper.primary_key_columns(),
            &keys,
        );
        self.filter(condition).all(&[])
    }

    /// Number of matching rows; limit and offset are ignored
    pub fn count(self) -> Result<u64, OrmError> {
        let mut select = self.aggregate_statement();
        select.expr_as(Func::count(Expr::col(Asterisk)), Ident::new(AGGREGATE));
        let row = self
            .manager
            .connection()
            .query_statement(select)?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::statement("count returned no row"))?;
        let count = row
            .get(AGGREGATE)
            .cloned()
            .ok_or_else(|| OrmError::statement("count returned no aggregate column"))?;
        let count = i64::from_value(count).map_err(|e| OrmError::TypeMismatch {
            column: AGGREGATE.to_string(),
            expected: "integer".to_string(),
            actual: e.to_string(),
        })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// One column of every matching row
    pub fn column(self, name: &str) -> Result<Vec<Value>, OrmError> {
        let mut select = self.select_statement(&[]);
        select.clear_selects();
        select.column((self.table(), Ident::new(name)));
        let rows = self.manager.connection().query_statement(select)?;
        rows.into_iter()
            .map(|mut row| {
                row.remove(name)
                    .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))
            })
            .collect()
    }

    fn ensure_writable(&self, what: &str) -> Result<(), OrmError> {
        if self.read_only {
            return Err(OrmError::ReadOnlyViolation(format!(
                "{what} on a read-only {} query",
                self.mapper.name()
            )));
        }
        Ok(())
    }

    fn bulk_update(self, assignments: Vec<(String, Expr)>) -> Result<u64, OrmError> {
        self.ensure_writable("update")?;
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut update = Query::update();
        update.table(self.table());
        for (column, value) in assignments {
            if self.mapper.is_primary_key(&column) {
                return Err(OrmError::ImmutableKeyViolation(column));
            }
            update.value(Ident::new(column), value);
        }
        if self.mapper.uses_timestamps() {
            update.value(Ident::new(UPDATED_AT), Expr::cust("CURRENT_TIMESTAMP"));
        }
        update.cond_where(self.target_condition()?);

        let affected = self.manager.connection().execute_statement(update)?;
        log::debug!(
            target: "rowbound::query",
            "updated {affected} {} row(s)",
            self.mapper.name()
        );
        Ok(affected)
    }

    /// Set columns on every matching row, returns the affected row count
    ///
    /// # Errors
    ///
    /// `ImmutableKeyViolation` when a primary-key column is assigned,
    /// `ReadOnlyViolation` on a read-only query.
    pub fn update<I, K, V>(self, columns: I) -> Result<u64, OrmError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let assignments = columns
            .into_iter()
            .map(|(column, value)| (column.into(), Expr::val(value.into())))
            .collect();
        self.bulk_update(assignments)
    }

    /// `column = column + by` on every matching row
    pub fn increment(self, column: &str, by: impl Into<Value>) -> Result<u64, OrmError> {
        let expr = Expr::col(Ident::new(column)).add(by.into());
        self.bulk_update(vec![(column.to_string(), expr)])
    }

    /// `column = column - by` on every matching row
    pub fn decrement(self, column: &str, by: impl Into<Value>) -> Result<u64, OrmError> {
        let expr = Expr::col(Ident::new(column)).sub(by.into());
        self.bulk_update(vec![(column.to_string(), expr)])
    }

    /// Delete every matching row, returns the affected row count
    ///
    /// Soft-delete entities get `deleted_at` set unless `force` is true.
    /// `tables` may only name the entity's own table; an empty slice means
    /// the same.
    ///
    /// # Errors
    ///
    /// `Unsupported` when `tables` names another table, or for a joined
    /// query on a composite primary key.
    pub fn delete(self, force: bool, tables: &[&str]) -> Result<u64, OrmError> {
        self.ensure_writable("delete")?;
        let table = self.mapper.table_name();
        if let Some(other) = tables.iter().find(|t| **t != table) {
            return Err(OrmError::Unsupported(format!(
                "deleting from {other} through a {} query",
                self.mapper.name()
            )));
        }

        let condition = self.target_condition()?;
        let connection = self.manager.connection();
        let affected = if self.mapper.uses_soft_delete() && !force {
            let mut update = Query::update();
            update
                .table(self.table())
                .value(Ident::new(DELETED_AT), Expr::cust("CURRENT_TIMESTAMP"))
                .cond_where(condition);
            connection.execute_statement(update)?
        } else {
            let mut delete = Query::delete();
            delete.from_table(self.table()).cond_where(condition);
            connection.execute_statement(delete)?
        };
        log::debug!(
            target: "rowbound::query",
            "{} {affected} {} row(s)",
            if self.mapper.uses_soft_delete() && !force { "soft-deleted" } else { "deleted" },
            self.mapper.name()
        );
        Ok(affected)
    }
}
