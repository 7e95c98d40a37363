//! Literal rendering of prepared rows.

use super::{DataTable, DataValue, RuntimeValues};
use crate::core::traits::Dialect;
use crate::core::value::{SqlTypeCategory, SqlValue};
use crate::error::{MigrateError, Result};

/// One row as `(column, SQL literal)` pairs in table column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedRow {
    pub cells: Vec<(String, String)>,
}

impl RenderedRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }
}

/// Resolve runtime tokens and code lookups, then render literals.
pub fn render_rows(
    table: &DataTable,
    dialect: &dyn Dialect,
    runtime: &RuntimeValues,
) -> Result<Vec<RenderedRow>> {
    let mut rendered = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut cells = Vec::with_capacity(row.values.len());
        for column in &table.columns {
            let Some(value) = row.get(&column.name) else {
                continue;
            };
            let category = table.metadata.column(&column.name).map(|c| c.category());
            cells.push((
                column.name.clone(),
                render_value(table, dialect, runtime, value, category)?,
            ));
        }
        rendered.push(RenderedRow { cells });
    }
    Ok(rendered)
}

fn render_value(
    table: &DataTable,
    dialect: &dyn Dialect,
    runtime: &RuntimeValues,
    value: &DataValue,
    category: Option<SqlTypeCategory>,
) -> Result<String> {
    match value {
        DataValue::Value(v) => Ok(dialect.literal(v)),
        DataValue::Runtime(name) => runtime
            .resolve(name)
            .map(|v| dialect.literal(&fit_timestamp(v, category)))
            .ok_or_else(|| {
                MigrateError::parse(
                    table.full_name(),
                    format!("unresolved runtime value '^({})'", name),
                )
            }),
        DataValue::RefDataCode {
            schema,
            table: ref_table,
            key_column,
            code_column,
            code,
        } => Ok(format!(
            "(SELECT {} FROM {} WHERE {} = {})",
            dialect.quote_ident(key_column)?,
            dialect.qualify(schema, ref_table)?,
            dialect.quote_ident(code_column)?,
            dialect.literal(&SqlValue::Text(code.clone()))
        )),
    }
}

/// Runtime timestamps carry a UTC offset; columns without a time zone get
/// the UTC wall-clock time instead.
fn fit_timestamp(value: SqlValue, category: Option<SqlTypeCategory>) -> SqlValue {
    match (value, category) {
        (SqlValue::DateTimeOffset(dt), Some(SqlTypeCategory::DateTime)) => {
            SqlValue::DateTime(dt.naive_utc())
        }
        (value, _) => value,
    }
}
