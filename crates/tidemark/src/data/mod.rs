//! Hierarchical seed data.
//!
//! Documents are parsed into [`DataTable`]s (one per schema/table, merged
//! across documents in first-seen order), prepared with convention defaults,
//! then rendered into per-row insert or merge statements by the dialect.

mod coerce;
mod parser;
pub mod runtime;
mod statement;

pub use parser::{DataParser, DataParserArgs};
pub use runtime::RuntimeValues;
pub use statement::{render_rows, RenderedRow};

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::schema::DbTableSchema;
use crate::core::value::{SqlTypeCategory, SqlValue};
use crate::error::{MigrateError, Result};

/// Which generated statement clause a column participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnUsage {
    Both,
    /// Written on insert, never overwritten by a merge (Created* audit).
    InsertOnly,
    /// Written only when a merge updates an existing row (Updated* audit).
    UpdateOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub name: String,
    pub usage: ColumnUsage,
}

/// A parsed value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Value(SqlValue),
    /// `^(Name)` resolved at statement generation.
    Runtime(String),
    /// Reference-data code looked up to its primary key.
    RefDataCode {
        schema: String,
        table: String,
        key_column: String,
        code_column: String,
        code: String,
    },
}

impl DataValue {
    pub fn as_sql(&self) -> Option<&SqlValue> {
        match self {
            DataValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    /// Column name (as declared in the catalog) to value.
    pub values: IndexMap<String, DataValue>,
    /// Primary key was generated rather than supplied.
    pub generated_key: bool,
}

impl DataRow {
    pub fn get(&self, column: &str) -> Option<&DataValue> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }
}

/// Rows bound for one table.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub schema: String,
    pub name: String,
    /// Insert-or-update instead of plain insert.
    pub merge: bool,
    pub metadata: DbTableSchema,
    pub columns: Vec<DataColumn>,
    pub rows: Vec<DataRow>,
    /// Columns a merge matches existing rows on; set by `prepare`.
    pub match_columns: Vec<String>,
}

impl DataTable {
    pub fn new(metadata: DbTableSchema) -> Self {
        Self {
            schema: metadata.schema.clone(),
            name: metadata.name.clone(),
            merge: false,
            metadata,
            columns: Vec::new(),
            rows: Vec::new(),
            match_columns: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn usage(&self, column: &str) -> ColumnUsage {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .map(|c| c.usage)
            .unwrap_or(ColumnUsage::Both)
    }

    pub fn is_match_column(&self, column: &str) -> bool {
        self.match_columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Register a column in first-seen order.
    pub(crate) fn add_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            self.columns.push(DataColumn {
                name: name.to_string(),
                usage: ColumnUsage::Both,
            });
        }
    }

    fn set_usage(&mut self, name: &str, usage: ColumnUsage) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name)) {
            column.usage = usage;
        }
    }

    /// Fill `column` on rows that lack it.
    fn default_column(&mut self, column: &str, usage: ColumnUsage, value: impl Fn(usize) -> DataValue) {
        let mut used = false;
        for (index, row) in self.rows.iter_mut().enumerate() {
            if !row.contains(column) {
                row.values.insert(column.to_string(), value(index));
            }
            used = true;
        }
        if used {
            self.add_column(column);
            self.set_usage(column, usage);
        }
    }

    /// Apply convention defaults and settle the merge key.
    pub fn prepare(&mut self, args: &DataParserArgs) -> Result<()> {
        let metadata = self.metadata.clone();
        let conventions = &args.conventions;

        for column in &metadata.columns {
            let is_date = matches!(
                column.category(),
                SqlTypeCategory::Date | SqlTypeCategory::DateTime | SqlTypeCategory::DateTimeOffset
            );
            let token = if is_date { runtime::DATE_TIME_NOW } else { runtime::USER_NAME };

            if column.is_created_audit {
                self.default_column(&column.name, ColumnUsage::InsertOnly, |_| {
                    DataValue::Runtime(token.to_string())
                });
            } else if column.is_updated_audit {
                self.default_column(&column.name, ColumnUsage::UpdateOnly, |_| {
                    DataValue::Runtime(token.to_string())
                });
            } else if column.is_tenant_id {
                if let Some(tenant) = &args.tenant_id {
                    self.default_column(&column.name, ColumnUsage::Both, |_| {
                        DataValue::Value(SqlValue::Text(tenant.clone()))
                    });
                }
            } else if metadata.is_reference_data {
                if column.name.eq_ignore_ascii_case(&conventions.ref_data_is_active) {
                    self.default_column(&column.name, ColumnUsage::Both, |_| {
                        DataValue::Value(SqlValue::Bool(true))
                    });
                } else if column.name.eq_ignore_ascii_case(&conventions.ref_data_sort_order) {
                    self.default_column(&column.name, ColumnUsage::Both, |i| {
                        DataValue::Value(SqlValue::I64(i as i64 + 1))
                    });
                }
            }
        }

        let pk: Vec<String> = metadata.primary_key().iter().map(|c| c.name.clone()).collect();
        let keys_supplied = !pk.is_empty()
            && self
                .rows
                .iter()
                .all(|r| !r.generated_key && pk.iter().all(|k| r.contains(k)));

        self.match_columns = if keys_supplied {
            pk.clone()
        } else if let Some(code) = metadata.ref_data_code_column() {
            // Generated keys must not be overwritten on re-run.
            for key in &pk {
                self.set_usage(key, ColumnUsage::InsertOnly);
            }
            vec![code.name.clone()]
        } else {
            Vec::new()
        };

        if self.merge && self.match_columns.is_empty() {
            return Err(MigrateError::parse(
                self.full_name(),
                "merge requires primary key values (or a reference-data code) on every row",
            ));
        }
        Ok(())
    }
}
