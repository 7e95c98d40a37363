//! Core traits for the database boundary.
//!
//! - [`Database`]: executes SQL text against one connection
//! - [`Connector`]: opens the target and server-level (admin) connections
//! - [`Dialect`]: per-engine statement templates and literal formatting
//!
//! # Design Pattern
//!
//! `Dialect` is a **Strategy**: PostgreSQL and SQL Server provide
//! interchangeable SQL text for the same structured input, and the engine
//! treats every template as a pure function. `Database::select_schema` is a
//! **Template Method** whose default runs the dialect's introspection query.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use crate::config::{ConventionConfig, Provider};
use crate::core::schema::DbTableSchema;
use crate::core::value::SqlValue;
use crate::data::{DataTable, RenderedRow};
use crate::error::{MigrateError, Result};
use crate::schema_object::SchemaObjectDescriptor;
use crate::script::template::ScriptTemplate;

/// One result row with every value rendered as text.
///
/// Introspection queries cast their columns to text so both drivers can
/// return rows uniformly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl DbRow {
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Value by column name (case-insensitive); `None` for NULL or missing.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
            .and_then(|v| v.as_deref())
    }

    pub fn get_at(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    pub fn required(&self, column: &str) -> Result<&str> {
        self.get(column).ok_or_else(|| {
            MigrateError::execution("schema introspection", format!("row is missing '{}'", column))
        })
    }

    pub fn get_bool(&self, column: &str) -> bool {
        matches!(
            self.get(column).map(|v| v.to_lowercase()).as_deref(),
            Some("true" | "1" | "yes" | "t")
        )
    }

    pub fn get_i32(&self, column: &str) -> i32 {
        self.get(column).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// SQL execution boundary for one connection.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single statement, returning rows affected.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute a multi-statement batch as one unit (no transaction).
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query and return its rows.
    async fn query(&self, sql: &str) -> Result<Vec<DbRow>>;

    /// Introspect tables and views.
    async fn select_schema(
        &self,
        dialect: &dyn Dialect,
        conventions: &ConventionConfig,
    ) -> Result<Vec<DbTableSchema>> {
        let rows = self.query(dialect.select_schema_sql()).await?;
        DbTableSchema::from_rows(&rows, conventions)
    }

    /// Engine name for logging.
    fn db_type(&self) -> &str;
}

/// First column of the first row, if any.
pub async fn scalar(db: &dyn Database, sql: &str) -> Result<Option<String>> {
    let rows = db.query(sql).await?;
    Ok(rows.first().and_then(|r| r.get_at(0)).map(String::from))
}

/// Map every row of a query through `mapper`.
pub async fn query_map<T, F>(db: &dyn Database, sql: &str, mapper: F) -> Result<Vec<T>>
where
    F: Fn(&DbRow) -> Result<T>,
{
    db.query(sql).await?.iter().map(mapper).collect()
}

/// Opens connections for a configured target.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name of the target database.
    fn database_name(&self) -> &str;

    /// Connect to the target database.
    async fn connect(&self) -> Result<Arc<dyn Database>>;

    /// Connect to the server-level database used for create/drop.
    async fn connect_admin(&self) -> Result<Arc<dyn Database>>;
}

/// Per-engine SQL text.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn provider(&self) -> Provider;

    fn default_schema(&self) -> &'static str {
        self.provider().default_schema()
    }

    fn quote_ident(&self, name: &str) -> Result<String>;

    fn qualify(&self, schema: &str, name: &str) -> Result<String> {
        Ok(format!("{}.{}", self.quote_ident(schema)?, self.quote_ident(name)?))
    }

    /// Render a value as a SQL literal.
    fn literal(&self, value: &SqlValue) -> String;

    /// Split a script into separately executed batches.
    fn split_batches(&self, script: &str) -> Vec<String> {
        let trimmed = script.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }

    fn database_exists_sql(&self, database: &str) -> Result<String>;

    fn create_database_sql(&self, database: &str) -> Result<String>;

    fn drop_database_sql(&self, database: &str) -> Result<String>;

    fn journal_create_sql(&self, schema: &str, table: &str) -> Result<String>;

    fn journal_select_sql(&self, schema: &str, table: &str) -> Result<String>;

    fn journal_insert_sql(&self, schema: &str, table: &str, script_name: &str) -> Result<String>;

    /// Introspection query returning one row per column.
    fn select_schema_sql(&self) -> &'static str;

    /// Schemas owned by the engine that are never reset.
    fn is_system_schema(&self, schema: &str) -> bool;

    /// Bulk-delete statement for the given tables.
    fn reset_sql(&self, tables: &[&DbTableSchema]) -> Result<String>;

    /// Insert or merge statements for one table's rendered rows.
    fn data_sql(&self, table: &DataTable, rows: &[RenderedRow]) -> Result<String>;

    /// Pattern over a schema object script's leading statement.
    ///
    /// Captures `replace` (optional), `type`, `schema` (optional) and `name`.
    fn schema_object_pattern(&self) -> &'static Regex;

    fn drop_object_sql(&self, descriptor: &SchemaObjectDescriptor) -> Result<String>;

    /// Body for a new migration script.
    fn script_template(&self, template: ScriptTemplate, schema: &str, table: &str) -> Result<String>;
}
