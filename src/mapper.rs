//! Per-type entity metadata and its process-wide registry.
//!
//! Metadata is built the first time a type is used: defaults are derived
//! from the type name, then [`Entity::map_entity`] customises them. The
//! result is frozen behind an `Arc` and shared by every instance.

use crate::entity::Entity;
use crate::relation::def::{Relation, RelationBuilder};
use convert_case::{Case, Casing};
use once_cell::sync::{Lazy, OnceCell};
use std::any::TypeId;
use std::collections::{btree_map::Entry, BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

type Slot = Arc<OnceCell<Arc<EntityMapper>>>;

static REGISTRY: Lazy<RwLock<HashMap<TypeId, Slot>>> = Lazy::new(|| RwLock::new(HashMap::new()));

pub const DELETED_AT: &str = "deleted_at";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Mapping metadata of one entity type
#[derive(Debug, Clone)]
pub struct EntityMapper {
    type_name: &'static str,
    entity_name: String,
    table: Option<String>,
    primary_key: Vec<String>,
    columns: Vec<String>,
    soft_delete: bool,
    timestamps: bool,
    relations: BTreeMap<String, Relation>,
}

/// `my_app::models::CkRecord` -> `ck_record`
fn default_entity_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let short = base.rsplit("::").next().unwrap_or(base);
    short.to_case(Case::Snake)
}

impl EntityMapper {
    fn with_defaults(type_name: &'static str) -> Self {
        Self {
            type_name,
            entity_name: default_entity_name(type_name),
            table: None,
            primary_key: vec!["id".to_string()],
            columns: Vec::new(),
            soft_delete: false,
            timestamps: false,
            relations: BTreeMap::new(),
        }
    }

    /// Shared metadata for `T`, built on first use
    ///
    /// `map_entity` runs exactly once per type; concurrent first uses wait
    /// for it to finish.
    pub fn of<T: Entity>() -> Arc<EntityMapper> {
        let id = TypeId::of::<T>();
        let cached = REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        let slot = match cached {
            Some(slot) => slot,
            None => Arc::clone(
                REGISTRY
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(id)
                    .or_default(),
            ),
        };
        Arc::clone(slot.get_or_init(|| Arc::new(Self::build::<T>())))
    }

    fn build<T: Entity>() -> Self {
        let mut mapper = EntityMapper::with_defaults(std::any::type_name::<T>());
        mapper.columns(T::declared_columns().iter().copied());
        T::map_entity(&mut mapper);
        log::debug!(
            target: "rowbound::mapper",
            "mapped {} to table {} (pk: {})",
            mapper.type_name,
            mapper.table_name(),
            mapper.primary_key.join(", ")
        );
        mapper
    }

    // Builder methods, called from `Entity::map_entity`

    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = Some(name.into());
        self
    }

    pub fn entity_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.entity_name = name.into();
        self
    }

    pub fn primary_key(&mut self, column: impl Into<String>) -> &mut Self {
        self.primary_key = vec![column.into()];
        self
    }

    pub fn primary_keys<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the columns of the table
    ///
    /// A declared column missing from a fetched row (after a partial
    /// select) is re-read from the database on first access.
    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Rows are flagged through `deleted_at` instead of removed
    pub fn soft_delete(&mut self, enabled: bool) -> &mut Self {
        self.soft_delete = enabled;
        self
    }

    /// Maintain `created_at` / `updated_at` on save
    pub fn timestamps(&mut self, enabled: bool) -> &mut Self {
        self.timestamps = enabled;
        self
    }

    /// Declare a relation
    ///
    /// ```rust,ignore
    /// mapper.relation("articles").has_many::<Article>();
    /// mapper.relation("author").belongs_to::<User>().foreign_key("user_id");
    /// mapper.relation("tags").share_many::<Tag>().pivot("articles_tags");
    /// ```
    pub fn relation(&mut self, name: impl Into<String>) -> RelationBuilder<'_> {
        RelationBuilder::new(self, name.into())
    }

    pub(crate) fn insert_relation(&mut self, relation: Relation) -> &mut Relation {
        match self.relations.entry(relation.name.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(relation);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(relation),
        }
    }

    // Accessors

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Entity name used in default table, key and pivot names
    #[must_use]
    pub fn name(&self) -> &str {
        &self.entity_name
    }

    /// Table name; defaults to the entity name plus `s`
    #[must_use]
    pub fn table_name(&self) -> String {
        match &self.table {
            Some(table) => table.clone(),
            None => format!("{}s", self.entity_name),
        }
    }

    #[must_use]
    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    #[must_use]
    pub fn declared_columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Primary-key or declared column
    #[must_use]
    pub fn declares_column(&self, column: &str) -> bool {
        self.is_primary_key(column)
            || self.columns.iter().any(|c| c == column)
            || (self.soft_delete && column == DELETED_AT)
            || (self.timestamps && (column == CREATED_AT || column == UPDATED_AT))
    }

    #[must_use]
    pub fn uses_soft_delete(&self) -> bool {
        self.soft_delete
    }

    #[must_use]
    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    #[must_use]
    pub fn relation_def(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    #[must_use]
    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }
}

/// Build and cache metadata for `T` ahead of first use
pub fn register<T: Entity>() -> Arc<EntityMapper> {
    EntityMapper::of::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_mapper::DataMapper;
    use crate::entity::EntityData;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_default_entity_name() {
        assert_eq!(default_entity_name("app::models::User"), "user");
        assert_eq!(default_entity_name("app::models::CkRecord"), "ck_record");
        assert_eq!(default_entity_name("BlogPost"), "blog_post");
        assert_eq!(default_entity_name("app::Wrapper<app::Inner>"), "wrapper");
    }

    #[test]
    fn test_builder_and_defaults() {
        let mut mapper = EntityMapper::with_defaults("app::Article");
        assert_eq!(mapper.table_name(), "articles");
        assert_eq!(mapper.primary_key_columns(), ["id".to_string()]);

        mapper
            .table("posts")
            .primary_keys(["tenant", "slug"])
            .columns(["title"])
            .soft_delete(true);
        assert_eq!(mapper.table_name(), "posts");
        assert!(mapper.is_primary_key("slug"));
        assert!(mapper.declares_column("title"));
        assert!(mapper.declares_column(DELETED_AT));
        assert!(!mapper.declares_column(CREATED_AT));
    }

    static MAP_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Widget(DataMapper);

    impl EntityData for Widget {
        fn from_data_mapper(orm: DataMapper) -> Self {
            Self(orm)
        }

        fn orm(&self) -> &DataMapper {
            &self.0
        }

        fn orm_mut(&mut self) -> &mut DataMapper {
            &mut self.0
        }
    }

    impl Entity for Widget {
        fn map_entity(mapper: &mut EntityMapper) {
            MAP_CALLS.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            mapper.table("widget_parts");
        }
    }

    #[test]
    fn test_concurrent_first_use_maps_once() {
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    EntityMapper::of::<Widget>()
                })
            })
            .collect();
        let mappers: Vec<Arc<EntityMapper>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(MAP_CALLS.load(Ordering::SeqCst), 1);
        assert!(mappers.iter().all(|m| Arc::ptr_eq(m, &mappers[0])));
        assert_eq!(mappers[0].table_name(), "widget_parts");
    }
}
