//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL text for PostgreSQL
//! - [`PostgresConnector`]: target and admin connections over deadpool-postgres

mod connector;
mod dialect;

pub use connector::{PgDatabase, PostgresConnector};
pub use dialect::PostgresDialect;
