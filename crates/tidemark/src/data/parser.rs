//! Seed-data document parser.
//!
//! A document maps schema names to tables, and tables to arrays of rows:
//!
//! ```yaml
//! Ref:
//!   Gender:
//!     - F: Female          # reference-data shorthand for { Code, Text }
//!     - M: Male
//! Demo:
//!   $Person:               # `$` requests insert-or-update
//!     - PersonId: 1
//!       Gender: F          # code lookup into Ref.Gender via GenderId
//!       Address:           # child table; PersonId copied from the parent
//!         - Street: 1 Main St
//! ```

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::coerce::{coerce, scalar_text};
use super::runtime::NEW_GUID;
use super::{DataRow, DataTable, DataValue};
use crate::config::{Config, ConventionConfig};
use crate::core::schema::{DbColumnSchema, DbTableSchema, SchemaCatalog};
use crate::core::value::{SqlTypeCategory, SqlValue};
use crate::error::{MigrateError, Result};

/// Schema key that resolves a table in whichever schema holds it.
pub const ANY_SCHEMA: &str = "*";
/// Table-name prefix requesting merge semantics.
pub const MERGE_PREFIX: char = '$';

#[derive(Debug, Clone)]
pub struct DataParserArgs {
    pub conventions: ConventionConfig,
    /// Suffix that turns a reference-data name into its key column (`Gender` -> `GenderId`).
    pub id_suffix: String,
    pub tenant_id: Option<String>,
}

impl Default for DataParserArgs {
    fn default() -> Self {
        Self {
            conventions: ConventionConfig::default(),
            id_suffix: "Id".to_string(),
            tenant_id: None,
        }
    }
}

impl DataParserArgs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            conventions: config.conventions.clone(),
            id_suffix: config.data.id_suffix.clone(),
            tenant_id: config.data.tenant_id.clone(),
        }
    }
}

struct ParentKey<'c> {
    table: &'c DbTableSchema,
    value: DataValue,
}

/// Accumulates tables across any number of documents.
pub struct DataParser<'c> {
    catalog: &'c SchemaCatalog,
    args: DataParserArgs,
    tables: Vec<DataTable>,
}

impl<'c> DataParser<'c> {
    pub fn new(catalog: &'c SchemaCatalog, args: DataParserArgs) -> Self {
        Self {
            catalog,
            args,
            tables: Vec::new(),
        }
    }

    /// Tables parsed so far, in first-seen order.
    pub fn tables(&self) -> &[DataTable] {
        &self.tables
    }

    pub fn parse_yaml(&mut self, source: &str, text: &str) -> Result<()> {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| MigrateError::parse(source, e.to_string()))?;
        let value = serde_json::to_value(yaml).map_err(|e| MigrateError::parse(source, e.to_string()))?;
        self.parse_value(source, &value)
    }

    pub fn parse_json(&mut self, source: &str, text: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MigrateError::parse(source, e.to_string()))?;
        self.parse_value(source, &value)
    }

    /// Parse by file extension (`.json`, otherwise YAML).
    pub fn parse_document(&mut self, source: &str, text: &str) -> Result<()> {
        if source.to_lowercase().ends_with(".json") {
            self.parse_json(source, text)
        } else {
            self.parse_yaml(source, text)
        }
    }

    pub fn parse_value(&mut self, source: &str, document: &Value) -> Result<()> {
        let schemas = match document {
            Value::Object(map) => map,
            Value::Null => return Ok(()),
            _ => return Err(MigrateError::parse(source, "document root must be a mapping of schemas")),
        };

        for (schema, tables) in schemas {
            for (table_key, rows) in table_entries(source, schema, tables)? {
                let (name, merge) = split_merge_prefix(table_key);
                let metadata = self.resolve_table(source, schema, name)?;
                let rows = row_array(source, metadata, rows)?;
                debug!("{}: {} row(s) for {}", source, rows.len(), metadata.full_name());
                self.parse_rows(source, metadata, merge, rows, None)?;
            }
        }
        Ok(())
    }

    /// Prepare every table and hand them over.
    pub fn finish(mut self) -> Result<Vec<DataTable>> {
        for table in &mut self.tables {
            table.prepare(&self.args)?;
        }
        Ok(self.tables)
    }

    fn resolve_table(&self, source: &str, schema: &str, name: &str) -> Result<&'c DbTableSchema> {
        let catalog = self.catalog;
        let found = if schema == ANY_SCHEMA {
            catalog
                .find_any(name)
                .map_err(|e| MigrateError::parse(source, e.to_string()))?
        } else {
            catalog.find(schema, name)
        };
        match found {
            Some(table) if table.is_view => Err(MigrateError::parse(
                source,
                format!("{} is a view and cannot be loaded", table.full_name()),
            )),
            Some(table) => Ok(table),
            None => Err(MigrateError::parse(
                source,
                format!("table {}.{} does not exist in the database", schema, name),
            )),
        }
    }

    fn table_index(&mut self, metadata: &DbTableSchema, merge: bool) -> usize {
        let index = match self
            .tables
            .iter()
            .position(|t| t.metadata.is_named(&metadata.schema, &metadata.name))
        {
            Some(index) => index,
            None => {
                self.tables.push(DataTable::new(metadata.clone()));
                self.tables.len() - 1
            }
        };
        self.tables[index].merge |= merge;
        index
    }

    fn parse_rows(
        &mut self,
        source: &str,
        metadata: &'c DbTableSchema,
        merge: bool,
        rows: &[Value],
        parent: Option<ParentKey<'c>>,
    ) -> Result<()> {
        let index = self.table_index(metadata, merge);
        let parent_column = match &parent {
            Some(p) => Some(
                self.infer_parent_column(metadata, p.table)
                    .ok_or_else(|| {
                        table_error(
                            source,
                            metadata,
                            format!("cannot infer the foreign key to parent {}", p.table.full_name()),
                        )
                    })?
                    .name
                    .clone(),
            ),
            None => None,
        };

        for raw in rows {
            let fields = self.row_fields(source, metadata, raw)?;
            let mut row = DataRow::default();
            let mut children: Vec<(&str, &[Value])> = Vec::new();

            for (key, value) in fields.iter() {
                if let Some(column) = metadata.column(key) {
                    let coerced = coerce(column, value).map_err(|e| table_error(source, metadata, e))?;
                    row.values.insert(column.name.clone(), coerced);
                } else if let Value::Array(items) = value {
                    children.push((key.as_str(), items.as_slice()));
                } else if let Some((column, lookup)) = self.ref_data_lookup(metadata, key, value) {
                    row.values.insert(column.name.clone(), lookup);
                } else {
                    return Err(table_error(source, metadata, format!("unknown column '{}'", key)));
                }
            }

            if let (Some(column), Some(p)) = (&parent_column, &parent) {
                if !row.contains(column) {
                    row.values.insert(column.clone(), p.value.clone());
                }
            }

            self.establish_key(metadata, &mut row);

            let key_value = metadata
                .single_primary_key()
                .and_then(|pk| row.get(&pk.name))
                .cloned();

            let table = &mut self.tables[index];
            for column in row.values.keys() {
                table.add_column(column);
            }
            table.rows.push(row);

            for (child_key, child_rows) in children {
                let Some(value) = key_value.clone() else {
                    return Err(table_error(
                        source,
                        metadata,
                        format!("row has no primary key value to propagate to child '{}'", child_key),
                    ));
                };
                let (child_name, child_merge) = split_merge_prefix(child_key);
                let child = self.resolve_child(source, metadata, child_name)?;
                self.parse_rows(
                    source,
                    child,
                    child_merge,
                    child_rows,
                    Some(ParentKey { table: metadata, value }),
                )?;
            }
        }
        Ok(())
    }

    /// Row object, expanding reference-data shorthand.
    fn row_fields(&self, source: &str, metadata: &DbTableSchema, raw: &Value) -> Result<Map<String, Value>> {
        let Value::Object(fields) = raw else {
            return Err(table_error(source, metadata, "each row must be a mapping"));
        };

        if metadata.is_reference_data && fields.len() == 1 {
            if let Some((key, value)) = fields.iter().next() {
                let is_scalar = !value.is_array() && !value.is_object();
                if is_scalar && metadata.column(key).is_none() {
                    let conventions = &self.args.conventions;
                    let mut expanded = Map::new();
                    expanded.insert(conventions.ref_data_code.clone(), Value::String(key.clone()));
                    expanded.insert(conventions.ref_data_text.clone(), value.clone());
                    return Ok(expanded);
                }
            }
        }
        Ok(fields.clone())
    }

    /// `Gender: F` where `GenderId` references a reference-data table.
    fn ref_data_lookup(
        &self,
        metadata: &'c DbTableSchema,
        key: &str,
        value: &Value,
    ) -> Option<(&'c DbColumnSchema, DataValue)> {
        let column = metadata.column(&format!("{}{}", key, self.args.id_suffix))?;
        let fk = column.foreign_key.as_ref()?;
        let target = self.catalog.find(&fk.schema, &fk.table)?;
        let code_column = target.ref_data_code_column()?;
        if value.is_array() || value.is_object() {
            return None;
        }
        if value.is_null() {
            return Some((column, DataValue::Value(SqlValue::Null)));
        }
        Some((
            column,
            DataValue::RefDataCode {
                schema: target.schema.clone(),
                table: target.name.clone(),
                key_column: fk.column.clone(),
                code_column: code_column.name.clone(),
                code: scalar_text(value),
            },
        ))
    }

    /// Generate a missing UUID key and pin `^(NewGuid)` keys, so children see the final value.
    fn establish_key(&self, metadata: &DbTableSchema, row: &mut DataRow) {
        let Some(pk) = metadata.single_primary_key() else {
            return;
        };
        if pk.category() != SqlTypeCategory::Uuid || pk.is_identity {
            return;
        }
        let pinned = match row.get(&pk.name) {
            None => true,
            Some(DataValue::Runtime(name)) => name.eq_ignore_ascii_case(NEW_GUID),
            Some(_) => false,
        };
        if pinned {
            row.values
                .insert(pk.name.clone(), DataValue::Value(SqlValue::Uuid(Uuid::new_v4())));
            row.generated_key = true;
        }
    }

    /// Foreign-key column of `child` that holds the parent's key.
    fn infer_parent_column<'t>(
        &self,
        child: &'t DbTableSchema,
        parent: &DbTableSchema,
    ) -> Option<&'t DbColumnSchema> {
        let own_key = |c: &DbColumnSchema| c.is_primary_key && child.primary_key().len() == 1;

        child
            .columns
            .iter()
            .find(|c| {
                c.foreign_key
                    .as_ref()
                    .is_some_and(|fk| parent.is_named(&fk.schema, &fk.table))
            })
            .or_else(|| {
                let parent_pk = parent.single_primary_key()?;
                child
                    .column(&parent_pk.name)
                    .filter(|c| !own_key(*c))
            })
            .or_else(|| {
                child
                    .column(&format!("{}{}", parent.name, self.args.id_suffix))
                    .filter(|c| !own_key(*c))
            })
    }

    /// Child tables live in the parent's schema unless unique elsewhere.
    fn resolve_child(&self, source: &str, parent: &DbTableSchema, name: &str) -> Result<&'c DbTableSchema> {
        let catalog = self.catalog;
        if let Some(table) = catalog.find(&parent.schema, name) {
            return Ok(table);
        }
        catalog
            .find_any(name)
            .map_err(|e| MigrateError::parse(source, e.to_string()))?
            .ok_or_else(|| {
                table_error(
                    source,
                    parent,
                    format!("unknown column or child table '{}'", name),
                )
            })
    }
}

fn table_error(source: &str, table: &DbTableSchema, message: impl std::fmt::Display) -> MigrateError {
    MigrateError::parse(source, format!("{}: {}", table.full_name(), message))
}

fn split_merge_prefix(key: &str) -> (&str, bool) {
    match key.strip_prefix(MERGE_PREFIX) {
        Some(name) => (name.trim(), true),
        None => (key.trim(), false),
    }
}

/// Table entries of one schema: a mapping, or a sequence of mappings.
fn table_entries<'v>(source: &str, schema: &str, tables: &'v Value) -> Result<Vec<(&'v str, &'v Value)>> {
    match tables {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        Value::Array(items) => {
            let mut entries = Vec::new();
            for item in items {
                let Value::Object(map) = item else {
                    return Err(MigrateError::parse(
                        source,
                        format!("schema '{}' must list tables as mappings", schema),
                    ));
                };
                entries.extend(map.iter().map(|(k, v)| (k.as_str(), v)));
            }
            Ok(entries)
        }
        _ => Err(MigrateError::parse(
            source,
            format!("schema '{}' must map table names to rows", schema),
        )),
    }
}

fn row_array<'v>(source: &str, table: &DbTableSchema, rows: &'v Value) -> Result<&'v [Value]> {
    match rows {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Null => Ok(&[]),
        _ => Err(table_error(source, table, "rows must be a sequence")),
    }
}
