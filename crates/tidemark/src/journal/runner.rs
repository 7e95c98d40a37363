//! Journaled, fail-fast script execution.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Journal;
use crate::core::traits::{Database, Dialect};
use crate::error::{MigrateError, Result};
use crate::script::ScriptSource;

/// Counts from one `execute_scripts` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScriptRunSummary {
    pub executed: usize,
    pub skipped: usize,
}

/// Executes scripts in `(group_order, name)` order against one connection.
pub struct ScriptRunner {
    db: Arc<dyn Database>,
    dialect: Arc<dyn Dialect>,
    journal: Arc<dyn Journal>,
    cancel: CancellationToken,
}

impl ScriptRunner {
    pub fn new(
        db: Arc<dyn Database>,
        dialect: Arc<dyn Dialect>,
        journal: Arc<dyn Journal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            dialect,
            journal,
            cancel,
        }
    }

    /// Run every script not already journaled.
    ///
    /// Stops at the first failure; statements that ran before it stay
    /// committed and the failing script is not journaled. Cancellation is
    /// checked before each script.
    pub async fn execute_scripts(
        &self,
        mut scripts: Vec<ScriptSource>,
        verbose: bool,
    ) -> Result<ScriptRunSummary> {
        scripts.sort_by(|a, b| {
            a.group_order
                .cmp(&b.group_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        self.execute_in_order(&scripts, verbose).await
    }

    /// Run scripts exactly in the order given, with the same journal and
    /// fail-fast rules as [`ScriptRunner::execute_scripts`].
    pub async fn execute_in_order(
        &self,
        scripts: &[ScriptSource],
        verbose: bool,
    ) -> Result<ScriptRunSummary> {
        self.journal.ensure_exists().await?;

        let mut summary = ScriptRunSummary::default();
        for script in scripts {
            if self.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            if !script.run_always && self.journal.is_executed(&script.name).await? {
                debug!("Skipping {} (already journaled)", script.name);
                summary.skipped += 1;
                continue;
            }

            if verbose {
                info!("  {}", script.name);
            } else {
                debug!("Executing {} ({})", script.name, script.tag);
            }

            let body = script.read().await.map_err(|e| e.in_script(&script.name))?;
            for batch in self.dialect.split_batches(&body) {
                self.db
                    .execute_batch(&batch)
                    .await
                    .map_err(|e| e.in_script(&script.name))?;
            }

            if !script.run_always {
                self.journal.record(&script.name).await?;
            }
            summary.executed += 1;
        }

        Ok(summary)
    }
}
