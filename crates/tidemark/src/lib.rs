//! # tidemark
//!
//! Schema migration and seed-data orchestration for PostgreSQL and SQL Server.
//!
//! A run drives one target database through an ordered set of phases:
//!
//! - **Drop / Create** the database through the server's admin database
//! - **Migrate**: versioned scripts, journaled so each runs at most once
//! - **Schema**: views, functions, procedures and triggers, dropped and
//!   recreated (or replaced in place) in dependency order
//! - **Reset**: delete all table data
//! - **Data**: hierarchical YAML/JSON seed documents, inserted or merged
//!
//! ## Example
//!
//! ```rust,no_run
//! use tidemark::{Config, MigrationCommand, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> tidemark::Result<()> {
//!     let config = Config::load("tidemark.yaml")?.with_env_fallback();
//!     let migrator = Migrator::from_config(config)?;
//!     let report = migrator.migrate(MigrationCommand::DEPLOY_WITH_DATA).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod core;
pub mod data;
pub mod drivers;
pub mod error;
pub mod journal;
pub mod orchestrator;
pub mod schema_object;
pub mod script;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use command::{MigrationCommand, Phase};
pub use config::{Config, ConfigOverrides, Provider};
pub use self::core::{Connector, Database, DbRow, Dialect, SchemaCatalog, SqlValue};
pub use data::{DataParser, DataParserArgs, RuntimeValues};
pub use error::{MigrateError, Result};
pub use journal::{DbJournal, Journal, NoOpJournal, ScriptRunner};
pub use orchestrator::{
    generate_script, CodeGenerator, DefaultHooks, MigrationHooks, MigrationReport, Migrator,
    PhaseReport,
};
pub use schema_object::{SchemaObjectDescriptor, SchemaObjectManager};
pub use script::{DirectoryProvider, EmbeddedProvider, ResourceProvider, ScriptCatalog, ScriptSource};
