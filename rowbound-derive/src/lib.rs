//! Procedural macros for rowbound
//!
//! This crate provides the `EntityData` derive.

mod attributes;
mod macros;

use proc_macro::TokenStream;

/// Derive macro for `EntityData` - wires a struct to its `DataMapper` and
/// generates typed accessors
///
/// The struct must have named fields, one of them a `rowbound::DataMapper`
/// marked `#[orm]` (or simply named `orm`). Every other field is filled
/// with `Default::default()` when the entity is built from a row.
///
/// - `#[columns(name: Type, ...)]` generates `name(&self) -> Result<Type, OrmError>`
///   and `set_name(&mut self, Type) -> Result<(), OrmError>`
/// - `#[relations(author: User, tags: [Tag])]` generates
///   `author(&self) -> Result<Option<User>, OrmError>` and
///   `tags(&self) -> Result<Vec<Tag>, OrmError>`
///
/// # Example
///
/// ```ignore
/// #[derive(EntityData)]
/// #[columns(id: i64, user_id: i64, title: String, published: bool)]
/// #[relations(user: User, tags: [Tag])]
/// pub struct Article {
///     #[orm]
///     orm: DataMapper,
/// }
/// ```
#[proc_macro_derive(EntityData, attributes(columns, relations, orm))]
pub fn derive_entity_data(input: TokenStream) -> TokenStream {
    macros::derive_entity_data(input)
}
