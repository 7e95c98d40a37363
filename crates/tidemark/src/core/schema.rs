//! Introspected table and column metadata.
//!
//! The catalog is built once per run from the dialect's introspection query
//! and is read-only afterwards. Convention flags (audit, tenant, row version,
//! reference data) are derived from column names using [`ConventionConfig`].

use crate::config::ConventionConfig;
use crate::core::traits::DbRow;
use crate::core::value::SqlTypeCategory;
use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};

/// Foreign-key target of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

/// Column metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbColumnSchema {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub length: i32,
    pub precision: i32,
    pub scale: i32,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_unique: bool,
    pub foreign_key: Option<ForeignKeyRef>,

    pub is_created_audit: bool,
    pub is_updated_audit: bool,
    pub is_row_version: bool,
    pub is_tenant_id: bool,
    pub is_soft_deleted: bool,
    pub is_ref_data_code: bool,
    pub is_json: bool,
}

impl DbColumnSchema {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            ..Default::default()
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn references(mut self, schema: &str, table: &str, column: &str) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }

    pub fn category(&self) -> SqlTypeCategory {
        if self.is_json {
            SqlTypeCategory::Json
        } else {
            SqlTypeCategory::of(&self.sql_type)
        }
    }
}

/// Table or view metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbTableSchema {
    pub schema: String,
    pub name: String,
    pub is_view: bool,
    pub is_reference_data: bool,
    pub columns: Vec<DbColumnSchema>,
}

impl DbTableSchema {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: DbColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// `schema.name` for logging.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&DbColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Vec<&DbColumnSchema> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// The single primary-key column, if the key is not composite.
    pub fn single_primary_key(&self) -> Option<&DbColumnSchema> {
        match self.primary_key().as_slice() {
            [pk] => Some(pk),
            _ => None,
        }
    }

    pub fn ref_data_code_column(&self) -> Option<&DbColumnSchema> {
        self.columns.iter().find(|c| c.is_ref_data_code)
    }

    pub fn is_named(&self, schema: &str, name: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(name)
    }

    /// Derive convention flags from column names.
    pub fn apply_conventions(&mut self, conventions: &ConventionConfig) {
        let has = |name: &str| self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name));
        self.is_reference_data =
            !self.is_view && has(&conventions.ref_data_code) && has(&conventions.ref_data_text);

        let is_ref = self.is_reference_data;
        for column in &mut self.columns {
            let n = column.name.as_str();
            column.is_created_audit = n.eq_ignore_ascii_case(&conventions.created_date)
                || n.eq_ignore_ascii_case(&conventions.created_by);
            column.is_updated_audit = n.eq_ignore_ascii_case(&conventions.updated_date)
                || n.eq_ignore_ascii_case(&conventions.updated_by);
            column.is_row_version = n.eq_ignore_ascii_case(&conventions.row_version)
                || column.sql_type.eq_ignore_ascii_case("rowversion");
            column.is_tenant_id = n.eq_ignore_ascii_case(&conventions.tenant_id);
            column.is_soft_deleted = n.eq_ignore_ascii_case(&conventions.soft_deleted);
            column.is_ref_data_code = is_ref && n.eq_ignore_ascii_case(&conventions.ref_data_code);
            column.is_json = matches!(SqlTypeCategory::of(&column.sql_type), SqlTypeCategory::Json)
                || (!conventions.json_suffix.is_empty()
                    && n.len() > conventions.json_suffix.len()
                    && n.to_lowercase().ends_with(&conventions.json_suffix.to_lowercase()));
        }
    }

    /// Group introspection rows (one per column, ordered by table) into tables.
    pub fn from_rows(rows: &[DbRow], conventions: &ConventionConfig) -> Result<Vec<DbTableSchema>> {
        let mut tables: Vec<DbTableSchema> = Vec::new();

        for row in rows {
            let schema = row.required("table_schema")?;
            let name = row.required("table_name")?;
            let column_name = row.required("column_name")?;

            let is_new = tables
                .last()
                .map(|t| t.schema != schema || t.name != name)
                .unwrap_or(true);
            if is_new {
                let mut table = DbTableSchema::new(schema, name);
                table.is_view = row.get_bool("is_view");
                tables.push(table);
            }
            let Some(table) = tables.last_mut() else {
                continue;
            };

            // Multiple unique/foreign constraints can repeat a column.
            if let Some(existing) = table.columns.iter_mut().find(|c| c.name == column_name) {
                existing.is_unique |= row.get_bool("is_unique");
                if existing.foreign_key.is_none() {
                    existing.foreign_key = foreign_key_of(row);
                }
                continue;
            }

            table.columns.push(DbColumnSchema {
                name: column_name.to_string(),
                sql_type: row.get("data_type").unwrap_or_default().to_string(),
                nullable: row.get_bool("is_nullable"),
                length: row.get_i32("max_length"),
                precision: row.get_i32("numeric_precision"),
                scale: row.get_i32("numeric_scale"),
                is_primary_key: row.get_bool("is_primary_key"),
                is_identity: row.get_bool("is_identity"),
                is_unique: row.get_bool("is_unique"),
                foreign_key: foreign_key_of(row),
                ..Default::default()
            });
        }

        for table in &mut tables {
            table.apply_conventions(conventions);
        }
        Ok(tables)
    }
}

fn foreign_key_of(row: &DbRow) -> Option<ForeignKeyRef> {
    match (
        row.get("fk_schema"),
        row.get("fk_table"),
        row.get("fk_column"),
    ) {
        (Some(schema), Some(table), Some(column)) if !table.is_empty() => Some(ForeignKeyRef {
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }),
        _ => None,
    }
}

/// The introspected database model.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: Vec<DbTableSchema>,
    default_schema: String,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<DbTableSchema>, default_schema: impl Into<String>) -> Self {
        Self {
            tables,
            default_schema: default_schema.into(),
        }
    }

    pub fn tables(&self) -> &[DbTableSchema] {
        &self.tables
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub fn find(&self, schema: &str, name: &str) -> Option<&DbTableSchema> {
        self.tables.iter().find(|t| t.is_named(schema, name))
    }

    /// Resolve a table by name across all schemas (`*` documents).
    ///
    /// A unique match wins; otherwise the default schema breaks the tie.
    pub fn find_any(&self, name: &str) -> Result<Option<&DbTableSchema>> {
        let matches: Vec<&DbTableSchema> = self
            .tables
            .iter()
            .filter(|t| t.name.eq_ignore_ascii_case(name))
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            many => many
                .iter()
                .find(|t| t.schema.eq_ignore_ascii_case(&self.default_schema))
                .copied()
                .map(Some)
                .ok_or_else(|| {
                    MigrateError::parse(
                        name,
                        format!(
                            "table name is ambiguous across schemas: {}",
                            many.iter()
                                .map(|t| t.full_name())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    )
                }),
        }
    }
}
