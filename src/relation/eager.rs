//! Eager loading for a whole result set.
//!
//! For each requested relation:
//! 1. Collect the distinct, non-NULL owner keys of every fetched entity
//! 2. Fetch all related rows in one query
//! 3. Group them by the owner key and fill each entity's relation slot
//!
//! Owners whose key is NULL, or that matched nothing, get an empty result
//! and will not query again on access.

use crate::data_mapper::{DataMapper, Loaded};
use crate::entity_manager::EntityManager;
use crate::error::OrmError;
use crate::mapper::EntityMapper;
use crate::relation::lazy::{relation_query, OWNER_KEY_ALIAS};
use crate::value::KeyPart;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub(crate) fn preload(
    manager: &EntityManager,
    owner_mapper: &EntityMapper,
    owners: &[DataMapper],
    names: &[String],
) -> Result<(), OrmError> {
    if owners.is_empty() {
        return Ok(());
    }

    for name in names {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::eager_load_span(owner_mapper.name(), name, owners.len()).entered();

        let relation = owner_mapper
            .relation_def(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.clone()))?;
        let resolved = relation.resolve(owner_mapper)?;

        let mut owner_keys: Vec<Option<Vec<KeyPart>>> = Vec::with_capacity(owners.len());
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        for owner in owners {
            let values = resolved
                .owner_columns
                .iter()
                .map(|column| owner.lookup(column, false))
                .collect::<Result<Vec<_>, _>>()?;
            let parts = KeyPart::tuple(&values);
            if parts.iter().any(KeyPart::is_null) {
                owner_keys.push(None);
                continue;
            }
            if seen.insert(parts.clone()) {
                distinct.push(values);
            }
            owner_keys.push(Some(parts));
        }

        let mut groups: HashMap<Vec<KeyPart>, Vec<DataMapper>> = HashMap::new();
        if !distinct.is_empty() {
            let tagged = resolved.pivot.is_some();
            let select = relation_query(&resolved, &distinct, tagged);
            let rows = manager.connection().query_statement(select)?;
            #[cfg(feature = "metrics")]
            METRICS.record_relation_load(resolved.kind.as_str());

            for mut row in rows {
                let key: Vec<KeyPart> = if tagged {
                    (0..resolved.match_columns.len())
                        .map(|idx| {
                            row.remove(&format!("{OWNER_KEY_ALIAS}{idx}"))
                                .map_or(KeyPart::Null, |value| KeyPart::of(&value))
                        })
                        .collect()
                } else {
                    resolved
                        .match_columns
                        .iter()
                        .map(|column| row.get(column).map_or(KeyPart::Null, KeyPart::of))
                        .collect()
                };
                let related = DataMapper::hydrate(manager.clone(), Arc::clone(&resolved.related), row, false);
                groups.entry(key).or_default().push(related);
            }
        }

        log::debug!(
            target: "rowbound::relation",
            "eager loaded {}.{} for {} owner(s), {} distinct key(s)",
            owner_mapper.name(),
            name,
            owners.len(),
            distinct.len()
        );

        for (owner, key) in owners.iter().zip(owner_keys) {
            let related = key
                .and_then(|key| groups.get(&key).cloned())
                .unwrap_or_default();
            owner.prefill_relation(name, Loaded::from_rows(resolved.kind, related));
        }
    }
    Ok(())
}
