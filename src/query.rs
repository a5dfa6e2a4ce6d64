//! Entity queries.
//!
//! [`EntityQuery`] collects filters, joins, ordering, paging, eager-load
//! requests and the soft-delete scope (see `select`), then runs as a read
//! (`get`, `all`, `find`, `count`, `column`) or as a bulk write (`update`,
//! `delete`, `increment`, `decrement`), see `execution`.

pub(crate) mod execution;
pub mod select;
pub mod statement;

pub use select::EntityQuery;
pub use statement::Statement;
