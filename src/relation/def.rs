//! Relation metadata and its resolution into concrete key columns.
//!
//! A [`Relation`] is declared once per entity type through
//! [`EntityMapper::relation`]. Unspecified keys are derived from the entity
//! names and primary keys of both sides when the relation is first used:
//!
//! | kind        | owner columns            | matched columns                    |
//! |-------------|--------------------------|------------------------------------|
//! | has one/many| owner pk                 | `<owner>_<pk>` in related table    |
//! | belongs to  | `<related>_<pk>` in owner| related pk                         |
//! | share       | owner pk                 | `<owner>_<pk>` in pivot table      |

use crate::entity::Entity;
use crate::error::OrmError;
use crate::mapper::EntityMapper;
use crate::relation::identity::Identity;
use sea_query::Value;
use std::any::TypeId;
use std::sync::Arc;

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Related row holds a foreign key to the owner, at most one row
    HasOne,
    /// Related rows hold a foreign key to the owner
    HasMany,
    /// Owner row holds a foreign key to the related row
    BelongsTo,
    /// Linked through a pivot table, at most one row
    ShareOne,
    /// Linked through a pivot table
    ShareMany,
}

impl RelationKind {
    /// Whether the relation yields a list
    #[must_use]
    pub fn is_many(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ShareMany)
    }

    #[must_use]
    pub fn uses_pivot(self) -> bool {
        matches!(self, RelationKind::ShareOne | RelationKind::ShareMany)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::ShareOne => "share_one",
            RelationKind::ShareMany => "share_many",
        }
    }
}

/// Handle on the related entity type
#[derive(Debug, Clone, Copy)]
pub(crate) struct RelatedEntity {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) mapper: fn() -> Arc<EntityMapper>,
}

impl RelatedEntity {
    fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            mapper: EntityMapper::of::<T>,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PivotTable {
    table: Option<String>,
    owner_columns: Option<Identity>,
    related_columns: Option<Identity>,
}

/// A declared relation
#[derive(Debug, Clone)]
pub struct Relation {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) related: RelatedEntity,
    foreign_key: Option<Identity>,
    references: Option<Identity>,
    pivot: PivotTable,
    qualifiers: Vec<(String, Value)>,
}

/// Relation with every key column spelled out
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRelation {
    pub(crate) kind: RelationKind,
    pub(crate) related: Arc<EntityMapper>,
    /// Columns read from the owner row
    pub(crate) owner_columns: Vec<String>,
    /// Table holding the columns matched against the owner values
    pub(crate) match_table: String,
    pub(crate) match_columns: Vec<String>,
    pub(crate) pivot: Option<ResolvedPivot>,
    pub(crate) qualifiers: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedPivot {
    pub(crate) table: String,
    /// Pivot columns pointing at the related row
    pub(crate) related_columns: Vec<String>,
    /// Related-table columns those pivot columns reference
    pub(crate) related_key: Vec<String>,
}

fn check_arity(relation: &str, left: &[String], right: &[String]) -> Result<(), OrmError> {
    if left.len() == right.len() && !left.is_empty() {
        Ok(())
    } else {
        Err(OrmError::Relation(format!(
            "relation {relation}: key columns ({}) and ({}) differ in arity",
            left.join(", "),
            right.join(", ")
        )))
    }
}

impl Relation {
    fn new<T: Entity>(name: String, kind: RelationKind) -> Self {
        Self {
            name,
            kind,
            related: RelatedEntity::of::<T>(),
            foreign_key: None,
            references: None,
            pivot: PivotTable::default(),
            qualifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    #[must_use]
    pub fn related_type_name(&self) -> &'static str {
        self.related.type_name
    }

    pub(crate) fn related_mapper(&self) -> Arc<EntityMapper> {
        (self.related.mapper)()
    }

    /// Fill in default key columns against the owner's metadata
    pub(crate) fn resolve(&self, owner: &EntityMapper) -> Result<ResolvedRelation, OrmError> {
        let related = self.related_mapper();

        let (owner_columns, match_table, match_columns, pivot) = match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let owner_columns = match &self.references {
                    Some(columns) => columns.columns().to_vec(),
                    None => owner.primary_key_columns().to_vec(),
                };
                let match_columns = match &self.foreign_key {
                    Some(columns) => columns.columns().to_vec(),
                    None => Identity::prefixed(&owner_columns, owner.name())
                        .columns()
                        .to_vec(),
                };
                (owner_columns, related.table_name(), match_columns, None)
            }
            RelationKind::BelongsTo => {
                let match_columns = match &self.references {
                    Some(columns) => columns.columns().to_vec(),
                    None => related.primary_key_columns().to_vec(),
                };
                let owner_columns = match &self.foreign_key {
                    Some(columns) => columns.columns().to_vec(),
                    None => Identity::prefixed(&match_columns, related.name())
                        .columns()
                        .to_vec(),
                };
                (owner_columns, related.table_name(), match_columns, None)
            }
            RelationKind::ShareOne | RelationKind::ShareMany => {
                let owner_columns = owner.primary_key_columns().to_vec();
                let table = match &self.pivot.table {
                    Some(table) => table.clone(),
                    None => {
                        let mut names = [owner.name(), related.name()];
                        names.sort_unstable();
                        names.join("_")
                    }
                };
                let match_columns = match &self.pivot.owner_columns {
                    Some(columns) => columns.columns().to_vec(),
                    None => Identity::prefixed(&owner_columns, owner.name())
                        .columns()
                        .to_vec(),
                };
                let related_key = related.primary_key_columns().to_vec();
                let related_columns = match &self.pivot.related_columns {
                    Some(columns) => columns.columns().to_vec(),
                    None => Identity::prefixed(&related_key, related.name())
                        .columns()
                        .to_vec(),
                };
                check_arity(&self.name, &related_columns, &related_key)?;
                let pivot = ResolvedPivot {
                    table: table.clone(),
                    related_columns,
                    related_key,
                };
                (owner_columns, table, match_columns, Some(pivot))
            }
        };
        check_arity(&self.name, &owner_columns, &match_columns)?;

        Ok(ResolvedRelation {
            kind: self.kind,
            related,
            owner_columns,
            match_table,
            match_columns,
            pivot,
            qualifiers: self.qualifiers.clone(),
        })
    }
}

/// Starts a relation declaration, see [`EntityMapper::relation`]
pub struct RelationBuilder<'a> {
    mapper: &'a mut EntityMapper,
    name: String,
}

impl<'a> RelationBuilder<'a> {
    pub(crate) fn new(mapper: &'a mut EntityMapper, name: String) -> Self {
        Self { mapper, name }
    }

    pub fn has_one<T: Entity>(self) -> RelationOptions<'a> {
        self.define::<T>(RelationKind::HasOne)
    }

    pub fn has_many<T: Entity>(self) -> RelationOptions<'a> {
        self.define::<T>(RelationKind::HasMany)
    }

    pub fn belongs_to<T: Entity>(self) -> RelationOptions<'a> {
        self.define::<T>(RelationKind::BelongsTo)
    }

    pub fn share_one<T: Entity>(self) -> RelationOptions<'a> {
        self.define::<T>(RelationKind::ShareOne)
    }

    pub fn share_many<T: Entity>(self) -> RelationOptions<'a> {
        self.define::<T>(RelationKind::ShareMany)
    }

    fn define<T: Entity>(self, kind: RelationKind) -> RelationOptions<'a> {
        let relation = Relation::new::<T>(self.name, kind);
        RelationOptions {
            relation: self.mapper.insert_relation(relation),
        }
    }
}

/// Optional settings of a declared relation
pub struct RelationOptions<'a> {
    relation: &'a mut Relation,
}

impl RelationOptions<'_> {
    /// Foreign-key column(s): in the related table for has-one/has-many,
    /// in the owner table for belongs-to
    pub fn foreign_key(self, columns: impl Into<Identity>) -> Self {
        self.relation.foreign_key = Some(columns.into());
        self
    }

    /// Column(s) the foreign key points at, when not the primary key
    pub fn references(self, columns: impl Into<Identity>) -> Self {
        self.relation.references = Some(columns.into());
        self
    }

    pub fn pivot(self, table: impl Into<String>) -> Self {
        self.relation.pivot.table = Some(table.into());
        self
    }

    /// Pivot columns referencing the owner and the related entity
    pub fn pivot_keys(self, owner: impl Into<Identity>, related: impl Into<Identity>) -> Self {
        self.relation.pivot.owner_columns = Some(owner.into());
        self.relation.pivot.related_columns = Some(related.into());
        self
    }

    /// Extra equality predicate on the related rows
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.relation.qualifiers.push((column.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_mapper::DataMapper;
    use crate::entity::EntityData;

    macro_rules! entity {
        ($name:ident, |$mapper:ident| $body:block) => {
            struct $name(DataMapper);

            impl EntityData for $name {
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

            impl Entity for $name {
                fn map_entity($mapper: &mut EntityMapper) $body
            }
        };
    }

    entity!(User, |mapper| {
        mapper.relation("articles").has_many::<Article>();
    });
    entity!(Article, |mapper| {
        mapper.relation("user").belongs_to::<User>();
        mapper.relation("tags").share_many::<Tag>();
    });
    entity!(Tag, |_mapper| {});
    entity!(CkRecord, |mapper| {
        mapper.primary_keys(["key1", "key2"]);
        mapper.relation("children").has_many::<CkRelated>();
        mapper.relation("broken").has_many::<CkRelated>().foreign_key("parent");
    });
    entity!(CkRelated, |mapper| {
        mapper.relation("ck_record").belongs_to::<CkRecord>();
    });

    fn resolve<T: Entity>(name: &str) -> Result<ResolvedRelation, OrmError> {
        let mapper = EntityMapper::of::<T>();
        let relation = mapper.relation_def(name).expect("declared relation");
        relation.resolve(&mapper)
    }

    #[test]
    fn test_has_many_defaults() {
        let resolved = resolve::<User>("articles").unwrap();
        assert_eq!(resolved.owner_columns, ["id"]);
        assert_eq!(resolved.match_table, "articles");
        assert_eq!(resolved.match_columns, ["user_id"]);
        assert!(resolved.pivot.is_none());
    }

    #[test]
    fn test_belongs_to_defaults() {
        let resolved = resolve::<Article>("user").unwrap();
        assert_eq!(resolved.owner_columns, ["user_id"]);
        assert_eq!(resolved.match_table, "users");
        assert_eq!(resolved.match_columns, ["id"]);
    }

    #[test]
    fn test_share_defaults() {
        let resolved = resolve::<Article>("tags").unwrap();
        assert_eq!(resolved.match_table, "article_tag");
        assert_eq!(resolved.match_columns, ["article_id"]);
        let pivot = resolved.pivot.unwrap();
        assert_eq!(pivot.related_columns, ["tag_id"]);
        assert_eq!(pivot.related_key, ["id"]);
    }

    #[test]
    fn test_composite_defaults() {
        let resolved = resolve::<CkRecord>("children").unwrap();
        assert_eq!(resolved.match_table, "ck_relateds");
        assert_eq!(resolved.match_columns, ["ck_record_key1", "ck_record_key2"]);

        let resolved = resolve::<CkRelated>("ck_record").unwrap();
        assert_eq!(resolved.owner_columns, ["ck_record_key1", "ck_record_key2"]);
        assert_eq!(resolved.match_columns, ["key1", "key2"]);
    }

    #[test]
    fn test_arity_mismatch() {
        let err = resolve::<CkRecord>("broken").unwrap_err();
        assert!(matches!(err, OrmError::Relation(_)));
    }

    #[test]
    fn test_kind_flags() {
        assert!(RelationKind::ShareMany.is_many());
        assert!(RelationKind::ShareOne.uses_pivot());
        assert!(!RelationKind::BelongsTo.is_many());
    }
}
