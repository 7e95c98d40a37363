//! Database-resident journal table.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::Journal;
use crate::core::traits::{query_map, Database, Dialect};
use crate::error::{MigrateError, Result};

/// Journal stored in a `(ScriptName, AppliedAtUtc)` table on the target.
///
/// The table is created on first use and the executed-name set is fetched
/// once, then kept current as scripts are recorded.
pub struct DbJournal {
    db: Arc<dyn Database>,
    dialect: Arc<dyn Dialect>,
    schema: String,
    table: String,
    created: OnceCell<()>,
    executed: Mutex<Option<HashSet<String>>>,
}

impl DbJournal {
    pub fn new(
        db: Arc<dyn Database>,
        dialect: Arc<dyn Dialect>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            db,
            dialect,
            schema: schema.into(),
            table: table.into(),
            created: OnceCell::new(),
            executed: Mutex::new(None),
        }
    }

    fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    async fn load_executed(&self) -> Result<HashSet<String>> {
        self.ensure_exists().await?;
        let sql = self.dialect.journal_select_sql(&self.schema, &self.table)?;
        let names = query_map(self.db.as_ref(), &sql, |row| {
            row.get_at(0).map(String::from).ok_or_else(|| {
                MigrateError::execution(self.full_name(), "journal row has no script name")
            })
        })
        .await?;
        debug!("Journal {} holds {} script(s)", self.full_name(), names.len());
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl Journal for DbJournal {
    async fn ensure_exists(&self) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                let sql = self.dialect.journal_create_sql(&self.schema, &self.table)?;
                for batch in self.dialect.split_batches(&sql) {
                    self.db
                        .execute_batch(&batch)
                        .await
                        .map_err(|e| e.in_script(&self.full_name()))?;
                }
                info!("Journal table {} is ready", self.full_name());
                Ok::<(), MigrateError>(())
            })
            .await?;
        Ok(())
    }

    async fn is_executed(&self, script_name: &str) -> Result<bool> {
        let mut executed = self.executed.lock().await;
        if executed.is_none() {
            *executed = Some(self.load_executed().await?);
        }
        Ok(executed
            .as_ref()
            .map(|set| set.contains(script_name))
            .unwrap_or(false))
    }

    async fn record(&self, script_name: &str) -> Result<()> {
        let sql = self
            .dialect
            .journal_insert_sql(&self.schema, &self.table, script_name)?;
        self.db
            .execute(&sql)
            .await
            .map_err(|e| e.in_script(script_name))?;

        if let Some(set) = self.executed.lock().await.as_mut() {
            set.insert(script_name.to_string());
        }
        Ok(())
    }

    fn journal_type(&self) -> &'static str {
        "database"
    }
}
