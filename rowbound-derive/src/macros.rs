//! Macro implementations

mod entity_data;

pub use entity_data::derive_entity_data;
