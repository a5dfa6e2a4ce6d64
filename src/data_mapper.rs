//! Per-instance state behind every entity.
//!
//! A `DataMapper` holds the row as last read or written, the set of
//! columns changed since, the relation cache, and the `new` / `read_only`
//! / `deleted` flags. Reads take `&self`: materialising a missing column
//! or loading a relation fills interior caches, so an entity can be read
//! through shared references.
//!
//! Relation slots move `Unloaded -> Loading -> Loaded | Failed`. A loaded
//! slot answers every later read without touching the database; a failed
//! one is retried on the next read.

use crate::entity::Entity;
use crate::entity_manager::EntityManager;
use crate::error::OrmError;
use crate::json::row_to_json;
use crate::mapper::{EntityMapper, UPDATED_AT};
use crate::query::statement::{key_condition, Ident};
use crate::relation::def::{Relation, RelationKind};
use crate::relation::lazy;
use crate::value::{is_null, null, FromValue, Row};
use sea_query::{Asterisk, Condition, Expr, Query, Value};
use serde::{Serialize, Serializer};
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Result of reading a name through [`DataMapper::get_column`]
#[derive(Debug, Clone)]
pub enum Attribute {
    Value(Value),
    One(Option<DataMapper>),
    Many(Vec<DataMapper>),
}

/// Loaded relation contents
#[derive(Debug, Clone)]
pub(crate) enum Loaded {
    One(Option<Box<DataMapper>>),
    Many(Vec<DataMapper>),
}

impl Loaded {
    pub(crate) fn empty(kind: RelationKind) -> Self {
        if kind.is_many() {
            Loaded::Many(Vec::new())
        } else {
            Loaded::One(None)
        }
    }

    pub(crate) fn from_rows(kind: RelationKind, mappers: Vec<DataMapper>) -> Self {
        if kind.is_many() {
            Loaded::Many(mappers)
        } else {
            Loaded::One(mappers.into_iter().next().map(Box::new))
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Loaded::One(Some(one)) => one.to_json(),
            Loaded::One(None) => serde_json::Value::Null,
            Loaded::Many(many) => serde_json::Value::Array(many.iter().map(DataMapper::to_json).collect()),
        }
    }
}

impl From<Loaded> for Attribute {
    fn from(loaded: Loaded) -> Self {
        match loaded {
            Loaded::One(one) => Attribute::One(one.map(|b| *b)),
            Loaded::Many(many) => Attribute::Many(many),
        }
    }
}

/// Observable state of a relation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone)]
enum Slot {
    Loading,
    Loaded(Loaded),
    Failed(String),
}

#[derive(Clone)]
pub struct DataMapper {
    manager: EntityManager,
    mapper: Arc<EntityMapper>,
    columns: RefCell<Row>,
    modified: BTreeSet<String>,
    relations: RefCell<HashMap<String, Slot>>,
    materialized: Cell<bool>,
    read_only: bool,
    is_new: bool,
    deleted: bool,
}

impl std::fmt::Debug for DataMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataMapper")
            .field("entity", &self.mapper.type_name())
            .field("columns", &self.columns.borrow())
            .field("modified", &self.modified)
            .field("read_only", &self.read_only)
            .field("is_new", &self.is_new)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

impl Serialize for DataMapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl DataMapper {
    /// Wrap a fetched row
    pub(crate) fn hydrate(
        manager: EntityManager,
        mapper: Arc<EntityMapper>,
        row: Row,
        read_only: bool,
    ) -> Self {
        Self {
            manager,
            mapper,
            columns: RefCell::new(row),
            modified: BTreeSet::new(),
            relations: RefCell::new(HashMap::new()),
            materialized: Cell::new(false),
            read_only,
            is_new: false,
            deleted: false,
        }
    }

    /// Empty, not yet persisted record
    pub(crate) fn fresh(manager: EntityManager, mapper: Arc<EntityMapper>) -> Self {
        let mut orm = Self::hydrate(manager, mapper, Row::new(), false);
        orm.is_new = true;
        orm
    }

    #[must_use]
    pub fn mapper(&self) -> &Arc<EntityMapper> {
        &self.mapper
    }

    #[must_use]
    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Columns changed since the last load or save
    #[must_use]
    pub fn modified_columns(&self) -> Vec<String> {
        self.modified.iter().cloned().collect()
    }

    fn ensure_live(&self) -> Result<(), OrmError> {
        if self.deleted {
            Err(OrmError::Deleted)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self, what: &str) -> Result<(), OrmError> {
        self.ensure_live()?;
        if self.read_only {
            return Err(OrmError::ReadOnlyViolation(what.to_string()));
        }
        Ok(())
    }

    fn cached(&self, name: &str) -> Option<Value> {
        self.columns.borrow().get(name).cloned()
    }

    /// Re-read the row by primary key and fill in columns not held yet
    fn materialize(&self) -> Result<(), OrmError> {
        if self.is_new || self.materialized.get() {
            return Ok(());
        }

        let key = self.primary_key_values()?;
        let table = self.mapper.table_name();
        let mut select = Query::select();
        select
            .column((Ident::new(table.as_str()), Asterisk))
            .from(Ident::new(table.as_str()))
            .cond_where(key_condition(&table, self.mapper.primary_key_columns(), &[key]))
            .limit(1);

        log::trace!(target: "rowbound::mapper", "materializing {} row", self.mapper.name());
        let rows = self.manager.connection().query_statement(select)?;
        // Only a completed read counts; a failed one is retried on next access
        self.materialized.set(true);
        if let Some(row) = rows.into_iter().next() {
            let mut columns = self.columns.borrow_mut();
            for (name, value) in row {
                columns.entry(name).or_insert(value);
            }
        }
        Ok(())
    }

    /// `strict == false` reads undeclared columns too, yielding NULL when absent
    pub(crate) fn lookup(&self, name: &str, strict: bool) -> Result<Value, OrmError> {
        self.ensure_live()?;
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }
        if strict && !self.mapper.declares_column(name) {
            return Err(OrmError::UnknownColumn(name.to_string()));
        }
        self.materialize()?;
        Ok(self.cached(name).unwrap_or_else(null))
    }

    /// Column value, re-reading the row if a declared column is missing
    ///
    /// # Errors
    ///
    /// `UnknownColumn` if the name is neither held nor declared, `Deleted`
    /// after deletion, `Persistence` if the re-read fails.
    pub fn column_value(&self, name: &str) -> Result<Value, OrmError> {
        self.lookup(name, true)
    }

    /// Read a column or a relation
    ///
    /// # Errors
    ///
    /// See [`DataMapper::column_value`]; relation loads may also fail with
    /// `Relation` or `Persistence`.
    pub fn get_column(&self, name: &str) -> Result<Attribute, OrmError> {
        self.ensure_live()?;
        if let Some(value) = self.cached(name) {
            return Ok(Attribute::Value(value));
        }
        if self.mapper.has_relation(name) {
            return self.load_relation(name).map(Attribute::from);
        }
        self.column_value(name).map(Attribute::Value)
    }

    /// Typed column read
    ///
    /// # Errors
    ///
    /// As [`DataMapper::column_value`], plus `TypeMismatch` when the stored
    /// value does not convert to `T`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, OrmError> {
        let value = self.column_value(name)?;
        T::from_value(value).map_err(|e| OrmError::TypeMismatch {
            column: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: e.to_string(),
        })
    }

    fn relation_for<T: Entity>(&self, name: &str) -> Result<&Relation, OrmError> {
        let relation = self
            .mapper
            .relation_def(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))?;
        if relation.related.type_id != TypeId::of::<T>() {
            return Err(OrmError::Relation(format!(
                "relation {name} yields {}, not {}",
                relation.related.type_name,
                std::any::type_name::<T>()
            )));
        }
        Ok(relation)
    }

    /// Related entity of a has-one, belongs-to or share-one relation
    ///
    /// # Errors
    ///
    /// `UnknownColumn` for an undeclared relation, `Relation` for a type or
    /// cardinality mismatch, `Persistence` if the load fails.
    pub fn related_one<T: Entity>(&self, name: &str) -> Result<Option<T>, OrmError> {
        self.relation_for::<T>(name)?;
        match self.load_relation(name)? {
            Loaded::One(one) => Ok(one.map(|orm| T::from_data_mapper(*orm))),
            Loaded::Many(_) => Err(OrmError::Relation(format!(
                "relation {name} yields many rows, use related_many"
            ))),
        }
    }

    /// Related entities of a has-many or share-many relation
    ///
    /// # Errors
    ///
    /// Same as [`DataMapper::related_one`].
    pub fn related_many<T: Entity>(&self, name: &str) -> Result<Vec<T>, OrmError> {
        self.relation_for::<T>(name)?;
        match self.load_relation(name)? {
            Loaded::Many(many) => Ok(many.into_iter().map(T::from_data_mapper).collect()),
            Loaded::One(_) => Err(OrmError::Relation(format!(
                "relation {name} yields at most one row, use related_one"
            ))),
        }
    }

    pub(crate) fn load_relation(&self, name: &str) -> Result<Loaded, OrmError> {
        self.ensure_live()?;
        match self.relations.borrow().get(name) {
            Some(Slot::Loaded(loaded)) => return Ok(loaded.clone()),
            Some(Slot::Loading) => {
                return Err(OrmError::Relation(format!("relation {name} is already being loaded")))
            }
            Some(Slot::Failed(reason)) => {
                log::debug!(target: "rowbound::relation", "retrying relation {name} after failure: {reason}");
            }
            None => {}
        }

        let relation = self
            .mapper
            .relation_def(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))?;

        self.relations.borrow_mut().insert(name.to_string(), Slot::Loading);
        match lazy::load(self, relation) {
            Ok(loaded) => {
                self.relations
                    .borrow_mut()
                    .insert(name.to_string(), Slot::Loaded(loaded.clone()));
                Ok(loaded)
            }
            Err(e) => {
                self.relations
                    .borrow_mut()
                    .insert(name.to_string(), Slot::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    pub(crate) fn prefill_relation(&self, name: &str, loaded: Loaded) {
        self.relations
            .borrow_mut()
            .insert(name.to_string(), Slot::Loaded(loaded));
    }

    #[must_use]
    pub fn relation_state(&self, name: &str) -> RelationState {
        match self.relations.borrow().get(name) {
            None => RelationState::Unloaded,
            Some(Slot::Loading) => RelationState::Loading,
            Some(Slot::Loaded(_)) => RelationState::Loaded,
            Some(Slot::Failed(_)) => RelationState::Failed,
        }
    }

    /// Whether the name is a held or declared column, or a relation
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.borrow().contains_key(name)
            || self.mapper.declares_column(name)
            || self.mapper.has_relation(name)
    }

    /// Assign a column and mark it dirty
    ///
    /// # Errors
    ///
    /// `ReadOnlyViolation`, `ImmutableKeyViolation` for a primary-key column
    /// of a persisted record, `Deleted`, or `Relation` when the name is a
    /// relation.
    pub fn set_column(&mut self, name: &str, value: impl Into<Value>) -> Result<(), OrmError> {
        self.ensure_writable(name)?;
        if !self.is_new && self.mapper.is_primary_key(name) {
            return Err(OrmError::ImmutableKeyViolation(name.to_string()));
        }
        if self.mapper.has_relation(name) {
            return Err(OrmError::Relation(format!(
                "{name} is a relation, use set_related, link or unlink"
            )));
        }
        self.assign(name, value.into());
        Ok(())
    }

    fn assign(&mut self, name: &str, value: Value) {
        self.columns.get_mut().insert(name.to_string(), value);
        self.modified.insert(name.to_string());

        // A changed foreign key invalidates cached belongs-to results
        let mapper = Arc::clone(&self.mapper);
        let stale: Vec<String> = mapper
            .relations()
            .filter(|relation| relation.kind == RelationKind::BelongsTo)
            .filter(|relation| {
                relation
                    .resolve(&mapper)
                    .map(|resolved| resolved.owner_columns.iter().any(|c| c == name))
                    .unwrap_or(false)
            })
            .map(|relation| relation.name.clone())
            .collect();
        let slots = self.relations.get_mut();
        for relation in stale {
            slots.remove(&relation);
        }
    }

    /// Point a belongs-to relation at `related` (or clear it with `None`)
    ///
    /// Sets the foreign-key columns; the change is written on save.
    ///
    /// # Errors
    ///
    /// `Unsupported` for other relation kinds, `Relation` when `related`
    /// has no key yet.
    pub fn set_related<T: Entity>(&mut self, name: &str, related: Option<&T>) -> Result<(), OrmError> {
        self.ensure_writable(name)?;
        let mapper = Arc::clone(&self.mapper);
        let relation = mapper
            .relation_def(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))?;
        self.relation_for::<T>(name)?;
        if relation.kind != RelationKind::BelongsTo {
            return Err(OrmError::Unsupported(format!(
                "set_related works on belongs-to relations, {name} is {}",
                relation.kind.as_str()
            )));
        }
        let resolved = relation.resolve(&mapper)?;

        let values = match related {
            Some(entity) => {
                let orm = entity.orm();
                let values = resolved
                    .match_columns
                    .iter()
                    .map(|column| orm.lookup(column, false))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.iter().any(is_null) {
                    return Err(OrmError::Relation(format!(
                        "cannot set {name}: related entity has no key yet, save it first"
                    )));
                }
                values
            }
            None => vec![null(); resolved.owner_columns.len()],
        };

        for (column, value) in resolved.owner_columns.iter().zip(values) {
            if !self.is_new && mapper.is_primary_key(column) {
                return Err(OrmError::ImmutableKeyViolation(column.clone()));
            }
            self.assign(column, value);
        }
        let loaded = Loaded::One(related.map(|entity| Box::new(entity.orm().clone())));
        self.relations
            .get_mut()
            .insert(name.to_string(), Slot::Loaded(loaded));
        Ok(())
    }

    /// Add a pivot row linking this record and `related`
    ///
    /// # Errors
    ///
    /// `Unsupported` for relations without a pivot table, `Relation` when
    /// either side has no key yet, `Persistence` on insert failure.
    pub fn link<T: Entity>(&mut self, name: &str, related: &T) -> Result<(), OrmError> {
        self.relation_for::<T>(name)?;
        self.change_pivot(name, related.orm(), true)
    }

    /// Remove the pivot row linking this record and `related`
    ///
    /// # Errors
    ///
    /// Same as [`DataMapper::link`].
    pub fn unlink<T: Entity>(&mut self, name: &str, related: &T) -> Result<(), OrmError> {
        self.relation_for::<T>(name)?;
        self.change_pivot(name, related.orm(), false)
    }

    fn change_pivot(&mut self, name: &str, related: &DataMapper, link: bool) -> Result<(), OrmError> {
        self.ensure_writable(name)?;
        let mapper = Arc::clone(&self.mapper);
        let relation = mapper
            .relation_def(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))?;
        let resolved = relation.resolve(&mapper)?;
        let pivot = resolved.pivot.as_ref().ok_or_else(|| {
            OrmError::Unsupported(format!(
                "{name} is a {} relation without a pivot table",
                relation.kind.as_str()
            ))
        })?;

        let owner_values = resolved
            .owner_columns
            .iter()
            .map(|column| self.lookup(column, false))
            .collect::<Result<Vec<_>, _>>()?;
        let related_values = pivot
            .related_key
            .iter()
            .map(|column| related.lookup(column, false))
            .collect::<Result<Vec<_>, _>>()?;
        if owner_values.iter().chain(&related_values).any(is_null) {
            return Err(OrmError::Relation(format!(
                "cannot change {name}: both entities must be saved first"
            )));
        }

        let connection = self.manager.connection();
        if link {
            let mut insert = Query::insert();
            insert
                .into_table(Ident::new(pivot.table.as_str()))
                .columns(
                    resolved
                        .match_columns
                        .iter()
                        .chain(&pivot.related_columns)
                        .map(|c| Ident::new(c.as_str())),
                )
                .values(owner_values.into_iter().chain(related_values).map(Expr::val))
                .map_err(|e| OrmError::statement(e.to_string()))?;
            connection.execute_statement(insert)?;
        } else {
            let condition = Condition::all()
                .add(key_condition(&pivot.table, &resolved.match_columns, &[owner_values]))
                .add(key_condition(&pivot.table, &pivot.related_columns, &[related_values]));
            let mut delete = Query::delete();
            delete.from_table(Ident::new(pivot.table.as_str())).cond_where(condition);
            connection.execute_statement(delete)?;
        }

        self.relations.get_mut().remove(name);
        Ok(())
    }

    /// Copy of the held columns, without loading anything
    #[must_use]
    pub fn get_raw_columns(&self) -> Row {
        self.columns.borrow().clone()
    }

    /// Held columns plus every loaded relation
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = row_to_json(&self.columns.borrow());
        if let serde_json::Value::Object(map) = &mut json {
            for (name, slot) in self.relations.borrow().iter() {
                if let Slot::Loaded(loaded) = slot {
                    map.insert(name.clone(), loaded.to_json());
                }
            }
        }
        json
    }

    /// Drop cached columns and relations and re-read the row
    ///
    /// # Errors
    ///
    /// `InvalidKey` for a record without a key, `Persistence` on failure.
    pub fn refresh(&mut self) -> Result<(), OrmError> {
        self.ensure_live()?;
        if self.is_new {
            return Ok(());
        }
        let key = self.primary_key_values()?;
        let mut columns = Row::new();
        for (column, value) in self.mapper.primary_key_columns().iter().zip(key) {
            columns.insert(column.clone(), value);
        }
        *self.columns.get_mut() = columns;
        self.modified.clear();
        self.relations.get_mut().clear();
        self.materialized.set(false);
        self.materialize()
    }

    pub(crate) fn primary_key_values(&self) -> Result<Vec<Value>, OrmError> {
        let columns = self.columns.borrow();
        self.mapper
            .primary_key_columns()
            .iter()
            .map(|column| match columns.get(column) {
                Some(value) if !is_null(value) => Ok(value.clone()),
                _ => Err(OrmError::InvalidKey(format!(
                    "{} has no value for primary key column {column}",
                    self.mapper.name()
                ))),
            })
            .collect()
    }

    /// Dirty columns with their current values
    pub(crate) fn dirty_values(&self) -> Vec<(String, Value)> {
        let columns = self.columns.borrow();
        self.modified
            .iter()
            .filter_map(|name| columns.get(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }

    pub(crate) fn mark_inserted(&mut self, returned: Option<Row>) {
        self.is_new = false;
        self.modified.clear();
        self.materialized.set(false);
        if let Some(row) = returned {
            self.columns.get_mut().extend(row);
        }
    }

    pub(crate) fn mark_updated(&mut self) {
        self.modified.clear();
        if self.mapper.uses_timestamps() {
            // Set by the database; re-read on next access
            self.columns.get_mut().remove(UPDATED_AT);
            self.materialized.set(false);
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
        self.relations.get_mut().clear();
    }
}
