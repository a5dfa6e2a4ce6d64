//! Per-instance relation loading.
//!
//! Builds the query for a resolved relation and a set of owner keys. The
//! same query shape serves lazy loads (one owner) and eager loads (many
//! owners); eager loads through a pivot also select the pivot's owner
//! columns under [`OWNER_KEY_ALIAS`] so rows can be grouped per owner.

use crate::data_mapper::{DataMapper, Loaded};
use crate::error::OrmError;
use crate::mapper::DELETED_AT;
use crate::query::statement::{key_condition, Ident};
use crate::relation::def::{Relation, ResolvedRelation};
use crate::value::is_null;
use sea_query::{Asterisk, Condition, Expr, ExprTrait, Order, Query, SelectStatement, Value};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub(crate) const OWNER_KEY_ALIAS: &str = "__rowbound_owner_";

pub(crate) fn relation_query(
    resolved: &ResolvedRelation,
    owner_keys: &[Vec<Value>],
    tag_owner: bool,
) -> SelectStatement {
    let related_table = resolved.related.table_name();
    let related = || Ident::new(related_table.as_str());

    let mut select = Query::select();
    select.column((related(), Asterisk)).from(related());

    if let Some(pivot) = &resolved.pivot {
        let pivot_table = || Ident::new(pivot.table.as_str());
        let mut on = Condition::all();
        for (pivot_column, related_column) in pivot.related_columns.iter().zip(&pivot.related_key) {
            on = on.add(
                Expr::col((pivot_table(), Ident::new(pivot_column.as_str())))
                    .equals((related(), Ident::new(related_column.as_str()))),
            );
        }
        select.inner_join(pivot_table(), on);

        if tag_owner {
            for (idx, column) in resolved.match_columns.iter().enumerate() {
                select.expr_as(
                    Expr::col((pivot_table(), Ident::new(column.as_str()))),
                    Ident::new(format!("{OWNER_KEY_ALIAS}{idx}")),
                );
            }
        }
    }

    let mut condition = Condition::all().add(key_condition(
        &resolved.match_table,
        &resolved.match_columns,
        owner_keys,
    ));
    for (column, value) in &resolved.qualifiers {
        condition = condition.add(Expr::col((related(), Ident::new(column.as_str()))).eq(value.clone()));
    }
    if resolved.related.uses_soft_delete() {
        condition = condition.add(Expr::col((related(), Ident::new(DELETED_AT))).is_null());
    }
    select.cond_where(condition);

    for column in resolved.related.primary_key_columns() {
        select.order_by((related(), Ident::new(column.as_str())), Order::Asc);
    }
    select
}

/// Load one relation of one owner
pub(crate) fn load(owner: &DataMapper, relation: &Relation) -> Result<Loaded, OrmError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::load_relation_span(
        owner.mapper().name(),
        relation.name(),
        relation.kind().as_str(),
    )
    .entered();

    let resolved = relation.resolve(owner.mapper())?;

    let mut key = Vec::with_capacity(resolved.owner_columns.len());
    for column in &resolved.owner_columns {
        let value = owner.lookup(column, false)?;
        if is_null(&value) {
            log::trace!(target: "rowbound::relation", "{} has no {column}, relation {} is empty", owner.mapper().name(), relation.name());
            return Ok(Loaded::empty(resolved.kind));
        }
        key.push(value);
    }

    let mut select = relation_query(&resolved, &[key], false);
    if !resolved.kind.is_many() {
        select.limit(1);
    }

    let manager = owner.manager();
    let rows = manager.connection().query_statement(select)?;
    #[cfg(feature = "metrics")]
    METRICS.record_relation_load(resolved.kind.as_str());
    log::debug!(
        target: "rowbound::relation",
        "loaded {} row(s) for {}.{}",
        rows.len(),
        owner.mapper().name(),
        relation.name()
    );

    let mappers = rows
        .into_iter()
        .map(|row| DataMapper::hydrate(manager.clone(), Arc::clone(&resolved.related), row, false))
        .collect();
    Ok(Loaded::from_rows(resolved.kind, mappers))
}
