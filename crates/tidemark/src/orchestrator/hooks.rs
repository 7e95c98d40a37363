//! Extension points around the phase sequence.

use async_trait::async_trait;
use std::path::Path;

use crate::command::Phase;
use crate::core::schema::SchemaCatalog;
use crate::core::traits::Database;
use crate::error::Result;

/// Called before and after every phase, selected or not.
///
/// Returning `Ok(false)` halts the run with [`crate::MigrateError::Vetoed`].
#[async_trait]
pub trait MigrationHooks: Send + Sync {
    async fn before_phase(&self, _phase: Phase, _selected: bool) -> Result<bool> {
        Ok(true)
    }

    async fn after_phase(&self, _phase: Phase, _selected: bool) -> Result<bool> {
        Ok(true)
    }
}

/// Pass-through hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl MigrationHooks for DefaultHooks {}

/// Generates code from the migrated schema during the CodeGen phase.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Returns a one-line summary for the phase report.
    async fn generate(
        &self,
        db: &dyn Database,
        catalog: &SchemaCatalog,
        output_dir: &Path,
    ) -> Result<String>;
}
