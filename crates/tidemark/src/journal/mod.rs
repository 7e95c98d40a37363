//! Script journal and the journaled script runner.
//!
//! The journal records every non-repeatable script once it has executed so
//! that a re-run only replays scripts that never reached the journal.

mod db;
mod noop;
mod runner;

pub use db::DbJournal;
pub use noop::NoOpJournal;
pub use runner::{ScriptRunSummary, ScriptRunner};

use async_trait::async_trait;

use crate::error::Result;

/// Persistent log of executed scripts.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Create the journal store if absent. Implementations memoize this.
    async fn ensure_exists(&self) -> Result<()>;

    /// Whether a script has already been journaled.
    async fn is_executed(&self, script_name: &str) -> Result<bool>;

    /// Record a successfully executed script.
    async fn record(&self, script_name: &str) -> Result<()>;

    /// Backend name for logging.
    fn journal_type(&self) -> &'static str;
}
