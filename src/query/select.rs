//! Query building for [`EntityQuery`].
//!
//! Building methods consume and return the query so they chain; nothing
//! touches the database until an execution method runs.

use crate::entity::Entity;
use crate::entity_manager::EntityManager;
use crate::error::OrmError;
use crate::mapper::{EntityMapper, DELETED_AT};
use crate::query::statement::Ident;
use sea_query::{
    Asterisk, Condition, Expr, ExprTrait, IntoCondition, Order, Query, SelectStatement, Value,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// Which soft-deleted rows a query sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SoftDeleteScope {
    Exclude,
    Include,
    Only,
}

/// Query builder for entities of type `T`
///
/// # Example
///
/// ```no_run
/// # use rowbound::{Entity, EntityData, DataMapper, EntityManager, Connection};
/// # #[derive(EntityData)]
/// # struct User { orm: DataMapper }
/// # impl Entity for User {}
/// use sea_query::{Expr, ExprTrait, Order};
///
/// # fn main() -> Result<(), rowbound::OrmError> {
/// # let em = EntityManager::new(Connection::sqlite_in_memory()?);
/// let adults = em
///     .query::<User>()
///     .filter(Expr::col("age").gte(18))
///     .order_by("name", Order::Asc)
///     .limit(10)
///     .with(["articles"])
///     .all(&[])?;
/// # Ok(())
/// # }
/// ```
pub struct EntityQuery<T: Entity> {
    pub(crate) manager: EntityManager,
    pub(crate) mapper: Arc<EntityMapper>,
    condition: Condition,
    joins: Vec<(String, Condition)>,
    orders: Vec<(Option<String>, String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    pub(crate) eager: Vec<String>,
    pub(crate) read_only: bool,
    scope: SoftDeleteScope,
    _phantom: PhantomData<T>,
}

impl<T: Entity> std::fmt::Debug for EntityQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQuery")
            .field("entity", &self.mapper.type_name())
            .field("condition", &self.condition)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("eager", &self.eager)
            .field("read_only", &self.read_only)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> EntityQuery<T> {
    pub(crate) fn new(manager: EntityManager, mapper: Arc<EntityMapper>) -> Self {
        Self {
            manager,
            mapper,
            condition: Condition::all(),
            joins: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            eager: Vec::new(),
            read_only: false,
            scope: SoftDeleteScope::Exclude,
            _phantom: PhantomData,
        }
    }

    /// Add a filter condition, ANDed with the previous ones
    pub fn filter<C: IntoCondition>(mut self, condition: C) -> Self {
        self.condition = self.condition.add(condition);
        self
    }

    /// `column = value` on the entity's table
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        let table = self.mapper.table_name();
        self.filter(Expr::col((Ident::new(table), Ident::new(column))).eq(value.into()))
    }

    /// Inner join another table
    pub fn join<C: IntoCondition>(mut self, table: &str, on: C) -> Self {
        self.joins.push((table.to_string(), on.into_condition()));
        self
    }

    /// Order by a column; `table.column` names a joined table's column
    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        let (table, column) = match column.split_once('.') {
            Some((table, column)) => (Some(table.to_string()), column.to_string()),
            None => (None, column.to_string()),
        };
        self.orders.push((table, column, order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Eager-load relations for every fetched entity
    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eager.extend(relations.into_iter().map(Into::into));
        self
    }

    /// Include soft-deleted rows
    pub fn with_soft_deleted(mut self) -> Self {
        self.scope = SoftDeleteScope::Include;
        self
    }

    /// Only soft-deleted rows
    pub fn only_soft_deleted(mut self) -> Self {
        self.scope = SoftDeleteScope::Only;
        self
    }

    /// Fetched entities reject every mutation
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub(crate) fn table(&self) -> Ident {
        Ident::new(self.mapper.table_name())
    }

    /// Filters plus the soft-delete scope
    pub(crate) fn effective_condition(&self) -> Condition {
        let mut condition = self.condition.clone();
        if self.mapper.uses_soft_delete() {
            let deleted_at = Expr::col((self.table(), Ident::new(DELETED_AT)));
            match self.scope {
                SoftDeleteScope::Exclude => condition = condition.add(deleted_at.is_null()),
                SoftDeleteScope::Only => condition = condition.add(deleted_at.is_not_null()),
                SoftDeleteScope::Include => {}
            }
        }
        condition
    }

    fn apply_joins(&self, select: &mut SelectStatement) {
        for (table, on) in &self.joins {
            select.inner_join(Ident::new(table.as_str()), on.clone());
        }
    }

    /// SELECT for `columns` (all columns when empty)
    ///
    /// Primary-key columns are always selected so the rows stay addressable.
    pub(crate) fn select_statement(&self, columns: &[&str]) -> SelectStatement {
        let mut select = Query::select();
        if columns.is_empty() {
            select.column((self.table(), Asterisk));
        } else {
            for pk in self.mapper.primary_key_columns() {
                if !columns.contains(&pk.as_str()) {
                    select.column((self.table(), Ident::new(pk.as_str())));
                }
            }
            for column in columns {
                select.column((self.table(), Ident::new(*column)));
            }
        }
        select.from(self.table());
        self.apply_joins(&mut select);
        select.cond_where(self.effective_condition());

        for (table, column, order) in &self.orders {
            let table = table.clone().map_or_else(|| self.table(), Ident::new);
            select.order_by((table, Ident::new(column.as_str())), order.clone());
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }
        select
    }

    /// SELECT without paging, for aggregates
    pub(crate) fn aggregate_statement(&self) -> SelectStatement {
        let mut select = Query::select();
        select.from(self.table());
        self.apply_joins(&mut select);
        select.cond_where(self.effective_condition());
        select
    }

    /// WHERE clause for bulk UPDATE / DELETE
    ///
    /// With joins the rows are addressed through `pk IN (SELECT pk ...)`,
    /// which needs a single-column primary key.
    pub(crate) fn target_condition(&self) -> Result<Condition, OrmError> {
        if self.joins.is_empty() {
            return Ok(self.effective_condition());
        }
        let pk = match self.mapper.primary_key_columns() {
            [pk] => pk.as_str(),
            columns => {
                return Err(OrmError::Unsupported(format!(
                    "bulk writes on joined queries need a single-column primary key, {} has {}",
                    self.mapper.name(),
                    columns.len()
                )))
            }
        };
        let mut sub = Query::select();
        sub.column((self.table(), Ident::new(pk))).from(self.table());
        self.apply_joins(&mut sub);
        sub.cond_where(self.effective_condition());
        Ok(Condition::all().add(Expr::col((self.table(), Ident::new(pk))).in_subquery(sub)))
    }
}
