//! Microsoft SQL Server driver.
//!
//! - [`SqlServerDialect`]: SQL text for SQL Server, including `GO` batch splitting
//! - [`SqlServerConnector`]: target and `master` connections over Tiberius

mod connector;
mod dialect;

pub use connector::{MssqlDatabase, SqlServerConnector, TiberiusConnectionManager};
pub use dialect::SqlServerDialect;
