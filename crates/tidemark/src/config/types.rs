//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Database engine the migrations target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "mssql", alias = "sql-server")]
    SqlServer,
}

impl Provider {
    /// Parse a provider name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Provider::Postgres),
            "sqlserver" | "mssql" | "sql-server" => Some(Provider::SqlServer),
            _ => None,
        }
    }

    /// Database used for server-level statements (create/drop database).
    pub fn default_admin_database(&self) -> &'static str {
        match self {
            Provider::Postgres => "postgres",
            Provider::SqlServer => "master",
        }
    }

    /// Default schema for unqualified objects.
    pub fn default_schema(&self) -> &'static str {
        match self {
            Provider::Postgres => "public",
            Provider::SqlServer => "dbo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Postgres => write!(f, "postgres"),
            Provider::SqlServer => write!(f, "sqlserver"),
        }
    }
}

/// Root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database engine.
    #[serde(default)]
    pub provider: Provider,

    /// Driver connection string for the target database.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Database used for create/drop (default depends on provider).
    #[serde(default)]
    pub admin_database: Option<String>,

    /// Root directory for generated scripts and the default resource directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directories probed for Migrations/Schema/Data, in priority order.
    #[serde(default)]
    pub resource_dirs: Vec<PathBuf>,

    /// Schema priority order for schema objects.
    #[serde(default)]
    pub schema_order: Vec<String>,

    /// Log every executed script at info level.
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub schema_objects: SchemaObjectConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub conventions: ConventionConfig,

    #[serde(default)]
    pub reset: ResetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            connection_string: None,
            admin_database: None,
            output_dir: default_output_dir(),
            resource_dirs: Vec::new(),
            schema_order: Vec::new(),
            verbose: false,
            journal: JournalConfig::default(),
            schema_objects: SchemaObjectConfig::default(),
            data: DataConfig::default(),
            conventions: ConventionConfig::default(),
            reset: ResetConfig::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_database", &self.admin_database)
            .field("output_dir", &self.output_dir)
            .field("resource_dirs", &self.resource_dirs)
            .field("schema_order", &self.schema_order)
            .field("verbose", &self.verbose)
            .field("journal", &self.journal)
            .field("schema_objects", &self.schema_objects)
            .field("data", &self.data)
            .field("conventions", &self.conventions)
            .field("reset", &self.reset)
            .finish()
    }
}

/// Location of the journal table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal schema (default: provider default schema).
    #[serde(default)]
    pub schema: Option<String>,

    /// Journal table name.
    #[serde(default = "default_journal_table")]
    pub table: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            schema: None,
            table: default_journal_table(),
        }
    }
}

/// Schema object (views, procedures, functions, triggers) behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaObjectConfig {
    /// Supported object types in creation order (default depends on provider).
    #[serde(default)]
    pub supported_types: Option<Vec<String>>,

    /// Types whose presence forces a full drop/create cycle.
    #[serde(default)]
    pub must_drop_types: Option<Vec<String>>,

    /// Always drop every object before recreating.
    #[serde(default)]
    pub force_drop: bool,
}

/// Seed-data loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Caller parameters available to `^(Name)` runtime tokens.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// User name for audit columns (default: OS user).
    #[serde(default)]
    pub user_name: Option<String>,

    /// Value written to tenant id columns when not specified.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Suffix appended to reference-data names to find their foreign key column.
    #[serde(default = "default_id_suffix")]
    pub id_suffix: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            parameters: BTreeMap::new(),
            user_name: None,
            tenant_id: None,
            id_suffix: default_id_suffix(),
        }
    }
}

/// Column naming conventions recognised during introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConventionConfig {
    pub created_date: String,
    pub created_by: String,
    pub updated_date: String,
    pub updated_by: String,
    pub tenant_id: String,
    pub row_version: String,
    pub soft_deleted: String,
    pub ref_data_code: String,
    pub ref_data_text: String,
    pub ref_data_is_active: String,
    pub ref_data_sort_order: String,
    /// Columns ending with this suffix are treated as JSON.
    pub json_suffix: String,
}

impl Default for ConventionConfig {
    fn default() -> Self {
        Self {
            created_date: "CreatedDate".into(),
            created_by: "CreatedBy".into(),
            updated_date: "UpdatedDate".into(),
            updated_by: "UpdatedBy".into(),
            tenant_id: "TenantId".into(),
            row_version: "RowVersion".into(),
            soft_deleted: "IsDeleted".into(),
            ref_data_code: "Code".into(),
            ref_data_text: "Text".into(),
            ref_data_is_active: "IsActive".into(),
            ref_data_sort_order: "SortOrder".into(),
            json_suffix: "Json".into(),
        }
    }
}

/// Reset phase options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetConfig {
    /// `schema.table` patterns (with `*` wildcards) never reset.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_journal_table() -> String {
    "SchemaJournal".to_string()
}

fn default_id_suffix() -> String {
    "Id".to_string()
}
