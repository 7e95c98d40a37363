//! Journal that records nothing.
//!
//! Used for batches made only of run-always scripts (schema object drops and
//! creates) where nothing should ever reach the journal table.

use async_trait::async_trait;

use super::Journal;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct NoOpJournal;

impl NoOpJournal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Journal for NoOpJournal {
    async fn ensure_exists(&self) -> Result<()> {
        Ok(())
    }

    async fn is_executed(&self, _script_name: &str) -> Result<bool> {
        Ok(false)
    }

    async fn record(&self, _script_name: &str) -> Result<()> {
        Ok(())
    }

    fn journal_type(&self) -> &'static str {
        "none"
    }
}
