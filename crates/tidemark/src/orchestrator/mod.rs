//! Migration orchestrator - runs the selected phases in their fixed order.

mod hooks;

pub use hooks::{CodeGenerator, DefaultHooks, MigrationHooks};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::command::{MigrationCommand, Phase};
use crate::config::Config;
use crate::core::identifier::wildcard_match;
use crate::core::schema::{DbTableSchema, SchemaCatalog};
use crate::core::traits::{scalar, Connector, Database, Dialect};
use crate::data::{render_rows, DataParser, DataParserArgs, RuntimeValues};
use crate::drivers::{connector_for, dialect_for};
use crate::error::{MigrateError, Result};
use crate::journal::{DbJournal, Journal, NoOpJournal, ScriptRunner};
use crate::schema_object::{SchemaObjectManager, SchemaObjectOptions};
use crate::script::template::create_script;
use crate::script::{
    is_post_create, ScriptCatalog, ScriptTemplate, DATA_NAMESPACE, MIGRATIONS_NAMESPACE,
    SCHEMA_NAMESPACE,
};

const SQL_EXTENSIONS: &[&str] = &["sql"];
const DATA_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Drives one target database through the lifecycle phases.
///
/// Everything runs sequentially on one target connection, opened on first
/// use. The journal and its executed-name cache live as long as the migrator.
pub struct Migrator {
    config: Config,
    connector: Arc<dyn Connector>,
    dialect: Arc<dyn Dialect>,
    scripts: ScriptCatalog,
    hooks: Arc<dyn MigrationHooks>,
    code_generator: Option<Arc<dyn CodeGenerator>>,
    runtime: RuntimeValues,
    cancel: CancellationToken,
    target: OnceCell<Arc<dyn Database>>,
    journal: OnceCell<Arc<dyn Journal>>,
    catalog: OnceCell<Arc<SchemaCatalog>>,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// The command, e.g. `deploy` or `migrate,schema,data`.
    pub command: String,

    pub database: String,

    pub provider: String,

    /// Final status.
    pub status: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Phases that ran, in order.
    pub phases: Vec<PhaseReport>,
}

/// Timing and summary for one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub elapsed_ms: u64,
    pub summary: String,
}

impl Migrator {
    /// Create a migrator with the configured dialect, resource directories and
    /// runtime values.
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let dialect = dialect_for(config.provider);
        let scripts = ScriptCatalog::from_dirs(&config.resource_dirs());
        let runtime = RuntimeValues::from_config(&config.data);
        Self {
            config,
            connector,
            dialect,
            scripts,
            hooks: Arc::new(DefaultHooks),
            code_generator: None,
            runtime,
            cancel: CancellationToken::new(),
            target: OnceCell::new(),
            journal: OnceCell::new(),
            catalog: OnceCell::new(),
        }
    }

    /// Create a migrator connecting through the configured provider.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let connector = connector_for(&config)?;
        Ok(Self::new(config, connector))
    }

    /// Replace the resource providers probed for scripts.
    pub fn with_scripts(mut self, scripts: ScriptCatalog) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn MigrationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.code_generator = Some(generator);
        self
    }

    /// Use a journal other than the database table.
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = OnceCell::new_with(Some(journal));
        self
    }

    pub fn with_runtime_values(mut self, runtime: RuntimeValues) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Run any command: phases, `execute` with its statements, or `script`
    /// with its template arguments.
    pub async fn run(&self, command: MigrationCommand, args: &[String]) -> Result<MigrationReport> {
        command.validate()?;
        if command == MigrationCommand::EXECUTE {
            return self.execute_sql(args).await;
        }
        if command == MigrationCommand::SCRIPT {
            let started_at = Utc::now();
            let started = Instant::now();
            let path = generate_script(&self.config, args)?;
            let phase = PhaseReport {
                phase: "script".into(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                summary: format!("wrote {}", path.display()),
            };
            return Ok(self.report(command, started_at, vec![phase]));
        }
        self.migrate(command).await
    }

    /// Run the selected phases in the order Drop, Create, Migrate, CodeGen,
    /// Schema, Reset, Data.
    ///
    /// Hooks see every phase, selected or not. The first failure aborts the
    /// remaining phases; scripts that already ran stay committed.
    pub async fn migrate(&self, command: MigrationCommand) -> Result<MigrationReport> {
        command.validate()?;
        if command.intersects(MigrationCommand::EXECUTE | MigrationCommand::SCRIPT) {
            return Err(MigrateError::Config(format!(
                "'{}' is not a phase command",
                command
            )));
        }

        let started_at = Utc::now();
        info!(
            "Running {} against {} ({})",
            command,
            self.connector.database_name(),
            self.dialect.name()
        );

        let mut phases = Vec::new();
        for phase in Phase::ORDER {
            let selected = command.includes(phase);
            if !self.hooks.before_phase(phase, selected).await? {
                return Err(MigrateError::Vetoed {
                    phase: phase.to_string(),
                });
            }
            if selected {
                if self.cancel.is_cancelled() {
                    return Err(MigrateError::Cancelled);
                }
                phases.push(self.timed(phase.name(), self.run_phase(phase)).await?);
            }
            if !self.hooks.after_phase(phase, selected).await? {
                return Err(MigrateError::Vetoed {
                    phase: phase.to_string(),
                });
            }
        }

        let report = self.report(command, started_at, phases);
        info!(
            "Migration {}: {} phase(s) in {:.1}s",
            report.status,
            report.phases.len(),
            report.duration_seconds
        );
        Ok(report)
    }

    /// Run SQL statements against the target, in order.
    pub async fn execute_sql(&self, statements: &[String]) -> Result<MigrationReport> {
        if statements.is_empty() {
            return Err(MigrateError::Config(
                "execute requires at least one SQL statement".into(),
            ));
        }

        let started_at = Utc::now();
        let phase = self
            .timed("execute", async {
                let db = self.target().await?;
                let mut affected = 0u64;
                for (i, statement) in statements.iter().enumerate() {
                    if self.cancel.is_cancelled() {
                        return Err(MigrateError::Cancelled);
                    }
                    let label = format!("statement {}", i + 1);
                    for batch in self.dialect.split_batches(statement) {
                        affected += db.execute(&batch).await.map_err(|e| e.in_script(&label))?;
                    }
                }
                Ok(format!(
                    "{} statement(s), {} row(s) affected",
                    statements.len(),
                    affected
                ))
            })
            .await?;
        Ok(self.report(MigrationCommand::EXECUTE, started_at, vec![phase]))
    }

    async fn timed(
        &self,
        name: &str,
        work: impl Future<Output = Result<String>>,
    ) -> Result<PhaseReport> {
        info!("Phase: {}", name);
        let started = Instant::now();
        let outcome = work.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(summary) => {
                info!("{} completed in {} ms: {}", name, elapsed_ms, summary);
                Ok(PhaseReport {
                    phase: name.to_string(),
                    elapsed_ms,
                    summary,
                })
            }
            Err(e) => {
                error!("{} failed after {} ms: {}", name, elapsed_ms, e);
                Err(e)
            }
        }
    }

    async fn run_phase(&self, phase: Phase) -> Result<String> {
        match phase {
            Phase::Drop => self.drop_database().await,
            Phase::Create => self.create_database().await,
            Phase::Migrate => self.apply_migrations().await,
            Phase::CodeGen => self.generate_code().await,
            Phase::Schema => self.apply_schema_objects().await,
            Phase::Reset => self.reset_data().await,
            Phase::Data => self.load_data().await,
        }
    }

    fn report(
        &self,
        command: MigrationCommand,
        started_at: DateTime<Utc>,
        phases: Vec<PhaseReport>,
    ) -> MigrationReport {
        let completed_at = Utc::now();
        MigrationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            database: self.connector.database_name().to_string(),
            provider: self.config.provider.to_string(),
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            phases,
        }
    }

    async fn target(&self) -> Result<Arc<dyn Database>> {
        let db = self
            .target
            .get_or_try_init(|| self.connector.connect())
            .await?;
        Ok(db.clone())
    }

    async fn journal(&self) -> Result<Arc<dyn Journal>> {
        let journal = self
            .journal
            .get_or_try_init(|| async {
                let db = self.target().await?;
                Ok::<Arc<dyn Journal>, MigrateError>(Arc::new(DbJournal::new(
                    db,
                    self.dialect.clone(),
                    self.config.journal_schema(),
                    self.config.journal.table.clone(),
                )))
            })
            .await?;
        Ok(journal.clone())
    }

    async fn runner(&self) -> Result<ScriptRunner> {
        Ok(ScriptRunner::new(
            self.target().await?,
            self.dialect.clone(),
            self.journal().await?,
            self.cancel.clone(),
        ))
    }

    /// Introspected once per run; every phase using it follows Migrate.
    async fn catalog(&self, db: &dyn Database) -> Result<Arc<SchemaCatalog>> {
        self.catalog
            .get_or_try_init(|| async {
                let mut tables = db
                    .select_schema(self.dialect.as_ref(), &self.config.conventions)
                    .await?;
                tables.retain(|t| !self.dialect.is_system_schema(&t.schema));
                debug!("Introspected {} table(s) and view(s)", tables.len());
                Ok::<_, MigrateError>(Arc::new(SchemaCatalog::new(
                    tables,
                    self.dialect.default_schema(),
                )))
            })
            .await
            .cloned()
    }

    async fn database_exists(&self, admin: &dyn Database, name: &str) -> Result<bool> {
        let sql = self.dialect.database_exists_sql(name)?;
        Ok(scalar(admin, &sql).await?.is_some())
    }

    async fn run_admin(&self, admin: &dyn Database, sql: &str) -> Result<()> {
        for batch in self.dialect.split_batches(sql) {
            admin.execute_batch(&batch).await?;
        }
        Ok(())
    }

    async fn drop_database(&self) -> Result<String> {
        let name = self.connector.database_name();
        let admin = self.connector.connect_admin().await?;
        if !self.database_exists(admin.as_ref(), name).await? {
            info!("Database {} does not exist", name);
            return Ok(format!("{} not present", name));
        }

        self.run_admin(admin.as_ref(), &self.dialect.drop_database_sql(name)?)
            .await?;
        info!("Dropped database {}", name);
        Ok(format!("dropped {}", name))
    }

    async fn create_database(&self) -> Result<String> {
        let name = self.connector.database_name();
        let admin = self.connector.connect_admin().await?;
        if self.database_exists(admin.as_ref(), name).await? {
            info!("Database {} already exists", name);
            return Ok(format!("{} already exists", name));
        }

        self.run_admin(admin.as_ref(), &self.dialect.create_database_sql(name)?)
            .await?;
        info!("Created database {}", name);

        let post_create: Vec<_> = self
            .scripts
            .discover(MIGRATIONS_NAMESPACE, SQL_EXTENSIONS)
            .await?
            .into_iter()
            .filter(|s| is_post_create(&s.name))
            .map(|s| s.run_always())
            .collect();
        let runner = ScriptRunner::new(
            self.target().await?,
            self.dialect.clone(),
            Arc::new(NoOpJournal::new()),
            self.cancel.clone(),
        );
        let summary = runner
            .execute_scripts(post_create, self.config.verbose)
            .await?;
        Ok(format!(
            "created {}, {} post-create script(s)",
            name, summary.executed
        ))
    }

    async fn apply_migrations(&self) -> Result<String> {
        let scripts: Vec<_> = self
            .scripts
            .discover(MIGRATIONS_NAMESPACE, SQL_EXTENSIONS)
            .await?
            .into_iter()
            .filter(|s| !is_post_create(&s.name))
            .map(|s| s.with_deploy_convention())
            .collect();
        if scripts.is_empty() {
            info!("No migration scripts found");
        }

        let summary = self
            .runner()
            .await?
            .execute_scripts(scripts, self.config.verbose)
            .await?;
        Ok(format!(
            "{} executed, {} skipped",
            summary.executed, summary.skipped
        ))
    }

    async fn generate_code(&self) -> Result<String> {
        let Some(generator) = &self.code_generator else {
            info!("No code generator configured, skipping");
            return Ok("skipped".to_string());
        };
        let db = self.target().await?;
        let catalog = self.catalog(db.as_ref()).await?;
        generator
            .generate(db.as_ref(), &catalog, &self.config.output_dir)
            .await
    }

    async fn apply_schema_objects(&self) -> Result<String> {
        let scripts = self
            .scripts
            .discover(SCHEMA_NAMESPACE, SQL_EXTENSIONS)
            .await?;
        let manager = SchemaObjectManager::new(
            self.dialect.as_ref(),
            SchemaObjectOptions::from_config(&self.config),
        );
        let summary = manager
            .apply(scripts, &self.runner().await?, self.config.verbose)
            .await?;
        Ok(format!(
            "{} dropped, {} created",
            summary.dropped, summary.created
        ))
    }

    fn is_resettable(&self, table: &DbTableSchema) -> bool {
        !table.is_view
            && !self.dialect.is_system_schema(&table.schema)
            && !table.is_named(self.config.journal_schema(), &self.config.journal.table)
            && !self
                .config
                .reset
                .exclude
                .iter()
                .any(|pattern| wildcard_match(pattern, &table.full_name()))
    }

    async fn reset_data(&self) -> Result<String> {
        let db = self.target().await?;
        let catalog = self.catalog(db.as_ref()).await?;
        let tables: Vec<&DbTableSchema> = catalog
            .tables()
            .iter()
            .filter(|t| self.is_resettable(t))
            .collect();
        if tables.is_empty() {
            info!("No tables to reset");
            return Ok("no tables".to_string());
        }

        let sql = self.dialect.reset_sql(&tables)?;
        for batch in self.dialect.split_batches(&sql) {
            if self.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            db.execute_batch(&batch)
                .await
                .map_err(|e| e.in_script("reset"))?;
        }
        Ok(format!("{} table(s) reset", tables.len()))
    }

    async fn load_data(&self) -> Result<String> {
        let documents = self
            .scripts
            .discover(DATA_NAMESPACE, DATA_EXTENSIONS)
            .await?;
        if documents.is_empty() {
            info!("No data documents found");
            return Ok("no data documents".to_string());
        }

        let db = self.target().await?;
        let catalog = self.catalog(db.as_ref()).await?;
        let mut parser = DataParser::new(&catalog, DataParserArgs::from_config(&self.config));
        for document in &documents {
            debug!("Parsing {} ({})", document.name, document.tag);
            let text = document.read().await?;
            parser.parse_document(&document.name, &text)?;
        }
        let tables = parser.finish()?;

        let mut rows = 0;
        for table in &tables {
            if self.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let rendered = render_rows(table, self.dialect.as_ref(), &self.runtime)?;
            if rendered.is_empty() {
                continue;
            }
            let sql = self.dialect.data_sql(table, &rendered)?;
            for batch in self.dialect.split_batches(&sql) {
                db.execute_batch(&batch)
                    .await
                    .map_err(|e| e.in_script(&table.full_name()))?;
            }
            if self.config.verbose {
                info!("  {} ({} row(s))", table.full_name(), rendered.len());
            } else {
                debug!("Loaded {} ({} row(s))", table.full_name(), rendered.len());
            }
            rows += rendered.len();
        }
        Ok(format!("{} row(s) in {} table(s)", rows, tables.len()))
    }
}

impl MigrationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write a new migration script from `[template] [schema.table | table | schema]`.
///
/// Needs no database connection.
pub fn generate_script(config: &Config, args: &[String]) -> Result<PathBuf> {
    let template = ScriptTemplate::parse(args.first().map(String::as_str).unwrap_or("default"))?;
    let target = args.get(1).map(String::as_str);
    let (schema, table) = match (template, target) {
        (ScriptTemplate::Schema, t) => (t, None),
        (_, Some(t)) => match t.split_once('.') {
            Some((schema, table)) => (Some(schema), Some(table)),
            None => (None, Some(t)),
        },
        (_, None) => (None, None),
    };
    let dialect = dialect_for(config.provider);
    create_script(
        dialect.as_ref(),
        &config.output_dir,
        template,
        schema,
        table,
        Utc::now(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DbColumnSchema;
    use crate::script::EmbeddedProvider;
    use crate::testing::RecordingDatabase;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeConnector {
        target: Arc<RecordingDatabase>,
        admin: Arc<RecordingDatabase>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn database_name(&self) -> &str {
            "demo"
        }

        async fn connect(&self) -> Result<Arc<dyn Database>> {
            Ok(self.target.clone())
        }

        async fn connect_admin(&self) -> Result<Arc<dyn Database>> {
            Ok(self.admin.clone())
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        calls: Mutex<Vec<String>>,
        veto_before: Option<Phase>,
    }

    #[async_trait]
    impl MigrationHooks for RecordingHooks {
        async fn before_phase(&self, phase: Phase, selected: bool) -> Result<bool> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("before {} {}", phase, selected));
            Ok(self.veto_before != Some(phase))
        }

        async fn after_phase(&self, phase: Phase, _selected: bool) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("after {}", phase));
            Ok(true)
        }
    }

    fn setup(
        target: RecordingDatabase,
        admin: RecordingDatabase,
        scripts: EmbeddedProvider,
    ) -> (Migrator, Arc<RecordingDatabase>, Arc<RecordingDatabase>) {
        let target = Arc::new(target);
        let admin = Arc::new(admin);
        let connector = Arc::new(FakeConnector {
            target: target.clone(),
            admin: admin.clone(),
        });
        let migrator = Migrator::new(Config::default(), connector)
            .with_scripts(ScriptCatalog::new(vec![Arc::new(scripts)]));
        (migrator, target, admin)
    }

    fn scripts() -> EmbeddedProvider {
        EmbeddedProvider::new("bundled")
            .with("Migrations/001-people.sql", "CREATE TABLE people (id int)")
            .with("Migrations/900-grants.post.deploy.sql", "GRANT SELECT ON people TO app")
            .with("Migrations/000-ext.post.database.create.sql", "CREATE EXTENSION citext")
            .with("Schema/vPeople.sql", "CREATE OR REPLACE VIEW public.v_people AS SELECT 1")
    }

    #[tokio::test]
    async fn test_phases_run_in_fixed_order_and_hooks_see_all() {
        let hooks = Arc::new(RecordingHooks::default());
        let (migrator, target, _) = setup(
            RecordingDatabase::new().with_journal_emulation(),
            RecordingDatabase::new(),
            scripts(),
        );
        let migrator = migrator.with_hooks(hooks.clone());

        let command: MigrationCommand = "schema|migrate".parse().unwrap();
        let report = migrator.migrate(command).await.unwrap();

        let phases: Vec<_> = report.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(phases, vec!["migrate", "schema"]);

        let calls = hooks.calls.lock().unwrap();
        assert_eq!(calls.len(), 14);
        assert_eq!(calls[0], "before drop false");
        assert_eq!(calls[4], "before migrate true");
        assert_eq!(calls[13], "after data");

        let executed = target.executed();
        let people = executed.iter().position(|s| s.contains("CREATE TABLE people")).unwrap();
        let grants = executed.iter().position(|s| s.contains("GRANT SELECT")).unwrap();
        let view = executed.iter().position(|s| s.contains("v_people")).unwrap();
        assert!(people < grants && grants < view);
        assert!(!executed.iter().any(|s| s.contains("citext")));
        assert_eq!(target.journal_inserts(), 1);
    }

    #[tokio::test]
    async fn test_second_run_skips_journaled_scripts() {
        let (migrator, target, _) = setup(
            RecordingDatabase::new().with_journal_emulation(),
            RecordingDatabase::new(),
            scripts(),
        );

        migrator.migrate(MigrationCommand::MIGRATE).await.unwrap();
        let report = migrator.migrate(MigrationCommand::MIGRATE).await.unwrap();

        assert_eq!(report.phases[0].summary, "1 executed, 1 skipped");
        let creates = target
            .executed()
            .iter()
            .filter(|s| s.contains("CREATE TABLE people"))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(target.journal_inserts(), 1);
    }

    #[tokio::test]
    async fn test_hook_veto_stops_before_phase() {
        let hooks = Arc::new(RecordingHooks {
            veto_before: Some(Phase::Schema),
            ..Default::default()
        });
        let (migrator, target, _) = setup(
            RecordingDatabase::new().with_journal_emulation(),
            RecordingDatabase::new(),
            scripts(),
        );
        let migrator = migrator.with_hooks(hooks);

        let err = migrator.migrate(MigrationCommand::DEPLOY).await.unwrap_err();
        assert!(matches!(err, MigrateError::Vetoed { ref phase } if phase == "schema"));
        assert!(!target.executed().iter().any(|s| s.contains("v_people")));
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_phases() {
        let (migrator, target, _) = setup(
            RecordingDatabase::new()
                .with_journal_emulation()
                .failing_on("CREATE TABLE people"),
            RecordingDatabase::new(),
            scripts(),
        );

        let err = migrator.migrate(MigrationCommand::DEPLOY).await.unwrap_err();
        assert!(err.to_string().contains("Migrations/001-people.sql"));
        assert_eq!(err.exit_code(), 5);
        assert!(!target.executed().iter().any(|s| s.contains("v_people")));
        assert_eq!(target.journal_inserts(), 0);
    }

    #[tokio::test]
    async fn test_drop_only_when_present() {
        let (migrator, _, admin) = setup(
            RecordingDatabase::new(),
            RecordingDatabase::new(),
            EmbeddedProvider::new("none"),
        );
        let report = migrator.migrate(MigrationCommand::DROP).await.unwrap();
        assert_eq!(report.phases[0].summary, "demo not present");
        assert!(admin.executed().is_empty());

        let (migrator, _, admin) = setup(
            RecordingDatabase::new(),
            RecordingDatabase::new().with_scalar("pg_database", "1"),
            EmbeddedProvider::new("none"),
        );
        migrator.migrate(MigrationCommand::DROP).await.unwrap();
        assert_eq!(admin.executed().len(), 1);
        assert!(admin.executed()[0].starts_with("DROP DATABASE IF EXISTS \"demo\""));
    }

    #[tokio::test]
    async fn test_create_runs_post_create_scripts_without_journal() {
        let (migrator, target, admin) = setup(
            RecordingDatabase::new().with_journal_emulation(),
            RecordingDatabase::new(),
            scripts(),
        );

        let report = migrator.migrate(MigrationCommand::CREATE).await.unwrap();
        assert_eq!(report.phases[0].summary, "created demo, 1 post-create script(s)");
        assert_eq!(admin.executed(), vec!["CREATE DATABASE \"demo\"".to_string()]);
        assert_eq!(target.executed(), vec!["CREATE EXTENSION citext".to_string()]);
        assert_eq!(target.journal_inserts(), 0);
    }

    #[tokio::test]
    async fn test_create_skips_existing_database() {
        let (migrator, target, admin) = setup(
            RecordingDatabase::new(),
            RecordingDatabase::new().with_scalar("pg_database", "1"),
            scripts(),
        );

        let report = migrator.migrate(MigrationCommand::CREATE).await.unwrap();
        assert_eq!(report.phases[0].summary, "demo already exists");
        assert!(admin.executed().is_empty());
        assert!(target.executed().is_empty());
    }

    #[tokio::test]
    async fn test_schema_is_introspected_once_per_run() {
        let tables = vec![DbTableSchema::new("public", "Person")
            .with_column(DbColumnSchema::new("Id", "int").primary_key())];
        let data = EmbeddedProvider::new("bundled")
            .with("Data/01-people.yaml", "public:\n  Person:\n    - Id: 1\n");
        let (migrator, target, _) = setup(
            RecordingDatabase::new().with_tables(tables),
            RecordingDatabase::new(),
            data,
        );

        let report = migrator.migrate(MigrationCommand::RESET_AND_DATA).await.unwrap();
        assert_eq!(report.phases.len(), 2);
        assert_eq!(report.phases[1].summary, "1 row(s) in 1 table(s)");
        assert_eq!(target.introspections(), 1);
    }

    #[tokio::test]
    async fn test_reset_skips_views_journal_and_exclusions() {
        let tables = vec![
            DbTableSchema::new("public", "Person").with_column(DbColumnSchema::new("Id", "int").primary_key()),
            DbTableSchema::new("public", "AuditLog").with_column(DbColumnSchema::new("Id", "int")),
            DbTableSchema::new("public", "SchemaJournal").with_column(DbColumnSchema::new("ScriptName", "varchar")),
            DbTableSchema {
                is_view: true,
                ..DbTableSchema::new("public", "vPerson")
            },
        ];
        let target = RecordingDatabase::new().with_tables(tables);
        let target = Arc::new(target);
        let connector = Arc::new(FakeConnector {
            target: target.clone(),
            admin: Arc::new(RecordingDatabase::new()),
        });
        let mut config = Config::default();
        config.reset.exclude = vec!["public.audit*".to_string()];
        let migrator = Migrator::new(config, connector)
            .with_scripts(ScriptCatalog::new(Vec::new()));

        let report = migrator.migrate(MigrationCommand::RESET).await.unwrap();
        assert_eq!(report.phases[0].summary, "1 table(s) reset");
        assert_eq!(
            target.executed(),
            vec!["TRUNCATE TABLE \"public\".\"Person\" RESTART IDENTITY;".to_string()]
        );
    }

    #[tokio::test]
    async fn test_execute_sql_and_cancellation() {
        let (migrator, target, _) = setup(
            RecordingDatabase::new(),
            RecordingDatabase::new(),
            EmbeddedProvider::new("none"),
        );
        let report = migrator
            .run(
                MigrationCommand::EXECUTE,
                &["UPDATE a SET b = 1".to_string(), "DELETE FROM c".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(report.phases[0].summary, "2 statement(s), 2 row(s) affected");
        assert_eq!(target.executed().len(), 2);

        assert!(migrator.execute_sql(&[]).await.is_err());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let migrator = migrator.with_cancellation(cancel);
        let err = migrator.migrate(MigrationCommand::MIGRATE).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[tokio::test]
    async fn test_codegen_skipped_without_generator() {
        let (migrator, _, _) = setup(
            RecordingDatabase::new(),
            RecordingDatabase::new(),
            EmbeddedProvider::new("none"),
        );
        let report = migrator.migrate(MigrationCommand::CODE_GEN).await.unwrap();
        assert_eq!(report.phases[0].summary, "skipped");

        let json = report.to_json().unwrap();
        assert!(json.contains("\"phase\": \"codegen\""));
        assert!(json.contains("\"database\": \"demo\""));
    }

    #[test]
    fn test_generate_script_parses_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let path = generate_script(&config, &["create".to_string(), "Sales.Order".to_string()]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-create-sales-order.sql"));
        assert!(path.starts_with(dir.path().join("Migrations")));

        let err = generate_script(&config, &["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Available"));
    }
}
