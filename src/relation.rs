//! Relations between entities.
//!
//! Relations are declared in [`crate::Entity::map_entity`] and loaded
//! lazily on first access (one query per relation per instance), or eagerly
//! for a whole result set with [`crate::EntityQuery::with`].

pub mod def;
pub(crate) mod eager;
pub mod identity;
pub(crate) mod lazy;

pub use def::{Relation, RelationBuilder, RelationKind, RelationOptions};
pub use identity::Identity;

/// Name of a qualified relation variant
///
/// `qualified_name("published", "articles", true)` is
/// `"published_articles"`; with `prefixed == false` the base relation name
/// `"articles"` is returned and the qualifier is not applied.
#[must_use]
pub fn qualified_name(qualifier: &str, base: &str, prefixed: bool) -> String {
    if prefixed {
        format!("{qualifier}_{base}")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("published", "articles", true), "published_articles");
        assert_eq!(qualified_name("published", "articles", false), "articles");
    }
}
