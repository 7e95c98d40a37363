//! Two-pass drop/create application of schema objects.

use serde::Serialize;
use tracing::{debug, error, info};

use super::SchemaObjectDescriptor;
use crate::config::Config;
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};
use crate::journal::ScriptRunner;
use crate::script::ScriptSource;

/// Ordering and drop rules for schema objects.
#[derive(Debug, Clone, Default)]
pub struct SchemaObjectOptions {
    /// Supported types in creation order.
    pub supported_types: Vec<String>,
    /// Types whose presence forces a full drop of every object.
    pub must_drop_types: Vec<String>,
    /// Schema priority order.
    pub schema_order: Vec<String>,
    /// Drop every object regardless of replace support.
    pub force_drop: bool,
}

impl SchemaObjectOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            supported_types: config.supported_object_types(),
            must_drop_types: config.must_drop_object_types(),
            schema_order: config.schema_order.clone(),
            force_drop: config.schema_objects.force_drop,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaObjectSummary {
    pub dropped: usize,
    pub created: usize,
}

/// Parses, orders and applies schema object scripts.
pub struct SchemaObjectManager<'a> {
    dialect: &'a dyn Dialect,
    options: SchemaObjectOptions,
}

impl<'a> SchemaObjectManager<'a> {
    pub fn new(dialect: &'a dyn Dialect, options: SchemaObjectOptions) -> Self {
        Self { dialect, options }
    }

    /// Read and parse every script, sorted in creation order.
    ///
    /// Any unparseable script or unsupported type fails the whole batch.
    pub async fn parse(&self, scripts: Vec<ScriptSource>) -> Result<Vec<SchemaObjectDescriptor>> {
        let mut descriptors = Vec::with_capacity(scripts.len());
        for script in scripts {
            let body = script.read().await?;
            descriptors.push(SchemaObjectDescriptor::parse(
                script,
                body,
                self.dialect,
                &self.options,
            ));
        }

        let failures: Vec<&SchemaObjectDescriptor> =
            descriptors.iter().filter(|d| d.has_error()).collect();
        if let Some(first) = failures.first() {
            for d in &failures {
                error!("{}: {}", d.script.name, d.error.as_deref().unwrap_or_default());
            }
            return Err(MigrateError::parse(
                first.script.name.clone(),
                format!(
                    "{} (and {} other invalid schema script(s))",
                    first.error.as_deref().unwrap_or_default(),
                    failures.len() - 1
                ),
            ));
        }

        descriptors.sort_by(|a, b| a.create_order(b));
        Ok(descriptors)
    }

    /// Whether every object is dropped before recreation.
    pub fn force_drop(&self, descriptors: &[SchemaObjectDescriptor]) -> bool {
        self.options.force_drop || descriptors.iter().any(|d| d.is_must_drop(&self.options))
    }

    /// Synthetic drop scripts, in reverse creation order.
    pub fn drop_scripts(&self, descriptors: &[SchemaObjectDescriptor]) -> Vec<ScriptSource> {
        let force = self.force_drop(descriptors);
        descriptors
            .iter()
            .rev()
            .filter(|d| force || !d.supports_replace)
            .map(|d| {
                ScriptSource::from_text(
                    format!("drop {} {}", d.object_type, d.full_name()),
                    d.drop_statement.clone(),
                )
                .with_tag(d.script.name.clone())
                .run_always()
            })
            .collect()
    }

    /// The original script bodies, in creation order.
    pub fn create_scripts(&self, descriptors: &[SchemaObjectDescriptor]) -> Vec<ScriptSource> {
        descriptors
            .iter()
            .map(|d| {
                ScriptSource::from_text(d.script.name.clone(), d.body.clone())
                    .with_tag(d.script.tag.clone())
                    .run_always()
            })
            .collect()
    }

    /// Drop what must go, then create every object.
    pub async fn apply(
        &self,
        scripts: Vec<ScriptSource>,
        runner: &ScriptRunner,
        verbose: bool,
    ) -> Result<SchemaObjectSummary> {
        let descriptors = self.parse(scripts).await?;
        if descriptors.is_empty() {
            info!("No schema objects found");
            return Ok(SchemaObjectSummary::default());
        }

        for d in &descriptors {
            debug!("{} -> {}", d.script.name, d.create_statement);
        }

        let drops = self.drop_scripts(&descriptors);
        if self.force_drop(&descriptors) {
            info!("Dropping all {} schema object(s)", drops.len());
        } else if !drops.is_empty() {
            info!("Dropping {} non-replaceable schema object(s)", drops.len());
        }
        let dropped = runner.execute_in_order(&drops, verbose).await?.executed;

        let creates = self.create_scripts(&descriptors);
        info!("Creating {} schema object(s)", creates.len());
        let created = runner.execute_in_order(&creates, verbose).await?.executed;

        Ok(SchemaObjectSummary { dropped, created })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mssql::SqlServerDialect;
    use crate::journal::NoOpJournal;
    use crate::testing::RecordingDatabase;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn options(force_drop: bool) -> SchemaObjectOptions {
        SchemaObjectOptions {
            supported_types: vec!["type".into(), "function".into(), "view".into(), "procedure".into(), "trigger".into()],
            must_drop_types: vec!["trigger".into()],
            schema_order: vec!["Ref".into(), "Demo".into()],
            force_drop,
        }
    }

    fn script(name: &str, body: &str) -> ScriptSource {
        ScriptSource::from_text(format!("Schema/{name}.sql"), body.to_string())
    }

    fn runner(db: &Arc<RecordingDatabase>) -> ScriptRunner {
        ScriptRunner::new(
            db.clone(),
            Arc::new(SqlServerDialect::new()),
            Arc::new(NoOpJournal::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_drop_order_is_reverse_of_create_order() {
        let dialect = SqlServerDialect::new();
        let manager = SchemaObjectManager::new(&dialect, options(true));
        let descriptors = manager
            .parse(vec![
                script("d", "CREATE VIEW [Demo].[vB] AS SELECT 1"),
                script("a", "CREATE FUNCTION [Ref].[fnA]() RETURNS INT AS BEGIN RETURN 1 END"),
                script("c", "CREATE FUNCTION [Demo].[fnB]() RETURNS INT AS BEGIN RETURN 1 END"),
                script("b", "CREATE VIEW [Ref].[vA] AS SELECT 1"),
            ])
            .await
            .unwrap();

        let creates: Vec<String> = manager
            .create_scripts(&descriptors)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(creates, vec!["Schema/a.sql", "Schema/b.sql", "Schema/c.sql", "Schema/d.sql"]);

        let drops: Vec<String> = manager
            .drop_scripts(&descriptors)
            .iter()
            .map(|s| s.tag.clone())
            .collect();
        let mut reversed = creates.clone();
        reversed.reverse();
        assert_eq!(drops, reversed);
    }

    #[tokio::test]
    async fn test_replaceable_objects_are_not_dropped() {
        let db = Arc::new(RecordingDatabase::new());
        let dialect = SqlServerDialect::new();
        let manager = SchemaObjectManager::new(&dialect, options(false));

        let summary = manager
            .apply(
                vec![
                    script("v", "CREATE OR ALTER VIEW [Demo].[vPerson] AS SELECT 1 AS x"),
                    script("p", "CREATE OR ALTER PROCEDURE [Demo].[spGet] AS SELECT 1"),
                ],
                &runner(&db),
                false,
            )
            .await
            .unwrap();

        assert_eq!(summary, SchemaObjectSummary { dropped: 0, created: 2 });
        assert!(!db.executed().iter().any(|s| s.starts_with("DROP")));
    }

    #[tokio::test]
    async fn test_non_replaceable_objects_are_dropped_first() {
        let db = Arc::new(RecordingDatabase::new());
        let dialect = SqlServerDialect::new();
        let manager = SchemaObjectManager::new(&dialect, options(false));

        manager
            .apply(
                vec![
                    script("v", "CREATE OR ALTER VIEW [Demo].[vPerson] AS SELECT 1 AS x"),
                    script("t", "CREATE TYPE [Demo].[IdList] AS TABLE (Id INT)"),
                ],
                &runner(&db),
                false,
            )
            .await
            .unwrap();

        let executed = db.executed();
        assert_eq!(executed[0], "DROP TYPE IF EXISTS [Demo].[IdList]");
        assert_eq!(executed.len(), 3);
    }

    #[tokio::test]
    async fn test_must_drop_type_forces_full_drop() {
        let db = Arc::new(RecordingDatabase::new());
        let dialect = SqlServerDialect::new();
        let manager = SchemaObjectManager::new(&dialect, options(false));

        let summary = manager
            .apply(
                vec![
                    script("v", "CREATE OR ALTER VIEW [Demo].[vPerson] AS SELECT 1 AS x"),
                    script("tr", "CREATE OR ALTER TRIGGER [Demo].[trPerson] ON [Demo].[Person] AFTER INSERT AS SELECT 1"),
                ],
                &runner(&db),
                false,
            )
            .await
            .unwrap();

        assert_eq!(summary.dropped, 2);
        let executed = db.executed();
        assert_eq!(executed[0], "DROP TRIGGER IF EXISTS [Demo].[trPerson]");
        assert_eq!(executed[1], "DROP VIEW IF EXISTS [Demo].[vPerson]");
    }

    #[tokio::test]
    async fn test_unknown_type_executes_nothing() {
        let db = Arc::new(RecordingDatabase::new());
        let dialect = SqlServerDialect::new();
        let manager = SchemaObjectManager::new(&dialect, options(true));

        let err = manager
            .apply(
                vec![
                    script("v", "CREATE VIEW [Demo].[vPerson] AS SELECT 1 AS x"),
                    script("s", "CREATE SYNONYM [Demo].[Person2] FOR [Demo].[Person]"),
                ],
                &runner(&db),
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Parse { ref source_name, .. } if source_name == "Schema/s.sql"));
        assert!(db.executed().is_empty());
    }
}
