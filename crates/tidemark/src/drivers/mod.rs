//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL driver
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module provides:
//! - a `Dialect`: SQL text for the engine (statement templates, literals, batches)
//! - a `Connector`: opens the target and admin databases as `Database` handles
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `Connector`
//! 3. Add a `Provider` variant and wire it into [`dialect_for`] and [`connector_for`]

pub mod common;
pub mod mssql;
pub mod postgres;

use std::sync::Arc;

pub use common::TlsBuilder;
pub use mssql::{SqlServerConnector, SqlServerDialect};
pub use postgres::{PostgresConnector, PostgresDialect};

use crate::config::{Config, Provider};
use crate::core::traits::{Connector, Dialect};
use crate::error::Result;

/// The dialect for a provider.
pub fn dialect_for(provider: Provider) -> Arc<dyn Dialect> {
    match provider {
        Provider::Postgres => Arc::new(PostgresDialect::new()),
        Provider::SqlServer => Arc::new(SqlServerDialect::new()),
    }
}

/// A connector for the configured provider and connection string.
///
/// No connection is opened here; a bad connection string fails as a
/// configuration error before any database contact.
pub fn connector_for(config: &Config) -> Result<Arc<dyn Connector>> {
    let connection_string = config.require_connection_string()?;
    let admin = config.admin_database();
    Ok(match config.provider {
        Provider::Postgres => Arc::new(PostgresConnector::new(connection_string, admin)?),
        Provider::SqlServer => Arc::new(SqlServerConnector::new(connection_string, admin)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_provider() {
        assert_eq!(dialect_for(Provider::Postgres).name(), "postgres");
        assert_eq!(dialect_for(Provider::SqlServer).name(), "mssql");
        assert_eq!(dialect_for(Provider::SqlServer).provider(), Provider::SqlServer);
    }

    #[test]
    fn test_connector_for_requires_connection_string() {
        let config = Config::from_yaml("provider: postgres\n").unwrap();
        let err = connector_for(&config).err().unwrap();
        assert_eq!(err.exit_code(), 2);

        let config = Config::from_yaml(
            "provider: postgres\nconnection_string: \"host=localhost dbname=demo\"\n",
        )
        .unwrap();
        let connector = connector_for(&config).unwrap();
        assert_eq!(connector.database_name(), "demo");
    }
}
