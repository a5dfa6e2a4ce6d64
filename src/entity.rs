//! Entity traits
//!
//! An entity is a struct holding a [`DataMapper`] (usually in a field
//! marked `#[orm]`). [`EntityData`] gives access to that mapper and is
//! normally derived; [`Entity`] declares the table mapping and provides
//! the active-record style operations on top of it.

use crate::data_mapper::DataMapper;
use crate::entity_manager::EntityManager;
use crate::error::OrmError;
use crate::key::Key;
use crate::mapper::EntityMapper;
use crate::query::EntityQuery;
use crate::value::Row;
use std::sync::Arc;

/// Access to the per-instance [`DataMapper`]
///
/// Derive it with `#[derive(EntityData)]`, which also generates typed
/// column and relation accessors.
pub trait EntityData: Sized {
    /// Build the entity around a mapper
    fn from_data_mapper(orm: DataMapper) -> Self;

    fn orm(&self) -> &DataMapper;

    fn orm_mut(&mut self) -> &mut DataMapper;

    /// Columns listed in `#[columns(...)]`
    fn declared_columns() -> &'static [&'static str] {
        &[]
    }
}

/// A type mapped to a table
///
/// # Example
///
/// ```no_run
/// use rowbound::{DataMapper, Entity, EntityData, EntityMapper};
///
/// #[derive(EntityData)]
/// #[columns(id: i64, name: String)]
/// #[relations(articles: [Article])]
/// struct User {
///     #[orm]
///     orm: DataMapper,
/// }
///
/// impl Entity for User {
///     fn map_entity(mapper: &mut EntityMapper) {
///         mapper.relation("articles").has_many::<Article>();
///     }
/// }
///
/// #[derive(EntityData)]
/// #[columns(id: i64, user_id: i64, title: String)]
/// struct Article {
///     #[orm]
///     orm: DataMapper,
/// }
///
/// impl Entity for Article {}
/// ```
pub trait Entity: EntityData + 'static {
    /// Declare table, keys and relations; called once per type
    fn map_entity(_mapper: &mut EntityMapper) {}

    fn mapper() -> Arc<EntityMapper> {
        EntityMapper::of::<Self>()
    }

    /// Query through the default manager
    ///
    /// # Errors
    ///
    /// `NoConnection` when no default manager is set.
    fn query() -> Result<EntityQuery<Self>, OrmError> {
        Ok(EntityManager::global()?.query::<Self>())
    }

    fn find(key: impl Into<Key>) -> Result<Option<Self>, OrmError> {
        EntityManager::global()?.find::<Self>(key)
    }

    fn find_all<I, K>(keys: I) -> Result<Vec<Self>, OrmError>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        EntityManager::global()?.find_all::<Self, I, K>(keys)
    }

    fn all() -> Result<Vec<Self>, OrmError> {
        Self::query()?.all(&[])
    }

    /// New unsaved entity from the default manager
    fn create() -> Result<Self, OrmError> {
        Ok(EntityManager::global()?.create::<Self>())
    }

    /// Insert or update through the entity's own manager
    ///
    /// Returns `false` when there was nothing to write.
    fn save(&mut self) -> Result<bool, OrmError> {
        let manager = self.orm().manager().clone();
        manager.save(self)
    }

    fn delete(&mut self, force: bool) -> Result<(), OrmError> {
        let manager = self.orm().manager().clone();
        manager.delete(self, force)
    }

    /// Loaded columns
    fn to_array(&self) -> Row {
        self.orm().get_raw_columns()
    }

    /// Loaded columns plus already loaded relations
    fn to_json(&self) -> serde_json::Value {
        self.orm().to_json()
    }
}
