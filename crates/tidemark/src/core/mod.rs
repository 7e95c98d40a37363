//! Core abstractions shared by every phase.
//!
//! - [`schema`]: introspected table and column metadata
//! - [`value`]: typed SQL values and type categories
//! - [`traits`]: database, connector and dialect boundaries
//! - [`identifier`]: identifier quoting and literal escaping

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{DbColumnSchema, DbTableSchema, ForeignKeyRef, SchemaCatalog};
pub use traits::{query_map, scalar, Connector, Database, DbRow, Dialect};
pub use value::{SqlTypeCategory, SqlValue};
