//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific SQL text for database lifecycle, the journal
//! table, introspection, reset, seed data and schema object drops.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Provider;
use crate::core::identifier::{escape_literal, qualify_pg, quote_pg, unquote};
use crate::core::schema::DbTableSchema;
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;
use crate::data::{ColumnUsage, DataTable, RenderedRow};
use crate::error::{MigrateError, Result};
use crate::schema_object::{strip_comments, SchemaObjectDescriptor};
use crate::script::template::ScriptTemplate;

static CREATE_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^\s*create\s+(?P<replace>or\s+replace\s+)?(?:(?:temp|temporary|unlogged|recursive|constraint)\s+)*(?P<type>materialized\s+view|event\s+trigger|\w+)\s+(?:if\s+not\s+exists\s+)?(?:(?P<schema>"(?:[^"]|"")+"|\w+)\s*\.\s*)?(?P<name>"(?:[^"]|"")+"|\w+)"#,
    )
    .expect("valid PostgreSQL create regex")
});

static TRIGGER_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bon\s+(?P<table>(?:(?:"(?:[^"]|"")+"|\w+)\s*\.\s*)?(?:"(?:[^"]|"")+"|\w+))"#)
        .expect("valid PostgreSQL trigger table regex")
});

const SELECT_SCHEMA: &str = r#"
SELECT c.table_schema::text AS table_schema,
       c.table_name::text AS table_name,
       (t.table_type = 'VIEW')::text AS is_view,
       c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       (c.is_nullable = 'YES')::text AS is_nullable,
       c.character_maximum_length::text AS max_length,
       c.numeric_precision::text AS numeric_precision,
       c.numeric_scale::text AS numeric_scale,
       (pk.column_name IS NOT NULL)::text AS is_primary_key,
       (c.is_identity = 'YES' OR coalesce(c.column_default, '') LIKE 'nextval(%')::text AS is_identity,
       (uq.column_name IS NOT NULL)::text AS is_unique,
       fk.fk_schema,
       fk.fk_table,
       fk.fk_column
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
LEFT JOIN (
    SELECT kcu.table_schema, kcu.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
) pk ON pk.table_schema = c.table_schema AND pk.table_name = c.table_name AND pk.column_name = c.column_name
LEFT JOIN (
    SELECT kcu.table_schema, kcu.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name
    WHERE tc.constraint_type = 'UNIQUE'
) uq ON uq.table_schema = c.table_schema AND uq.table_name = c.table_name AND uq.column_name = c.column_name
LEFT JOIN (
    SELECT kcu.table_schema, kcu.table_name, kcu.column_name,
           ccu.table_schema::text AS fk_schema,
           ccu.table_name::text AS fk_table,
           ccu.column_name::text AS fk_column
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = rc.constraint_schema AND kcu.constraint_name = rc.constraint_name
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_schema = rc.unique_constraint_schema AND ccu.constraint_name = rc.unique_constraint_name
) fk ON fk.table_schema = c.table_schema AND fk.table_name = c.table_name AND fk.column_name = c.column_name
WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
  AND c.table_schema NOT LIKE 'pg_toast%'
  AND c.table_schema NOT LIKE 'pg_temp%'
ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn string(value: &str) -> String {
        format!("'{}'", escape_literal(value))
    }

    /// Table named by the `ON` clause following `CREATE TRIGGER <name>`.
    fn trigger_table(body: &str) -> Option<String> {
        let stripped = strip_comments(body);
        let start = CREATE_OBJECT.find(&stripped)?.end();
        TRIGGER_TABLE
            .captures(&stripped[start..])
            .and_then(|c| c.name("table"))
            .map(|m| m.as_str().to_string())
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn provider(&self) -> Provider {
        Provider::Postgres
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(v) => format!("'{}'::float8", v),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Json(v) => format!("{}::jsonb", Self::string(v)),
            other => other
                .to_text()
                .map(|text| Self::string(&text))
                .unwrap_or_else(|| "NULL".to_string()),
        }
    }

    fn database_exists_sql(&self, database: &str) -> Result<String> {
        quote_pg(database)?;
        Ok(format!(
            "SELECT 1 FROM pg_database WHERE datname = {}",
            Self::string(database)
        ))
    }

    fn create_database_sql(&self, database: &str) -> Result<String> {
        Ok(format!("CREATE DATABASE {}", quote_pg(database)?))
    }

    fn drop_database_sql(&self, database: &str) -> Result<String> {
        Ok(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", quote_pg(database)?))
    }

    fn journal_create_sql(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};\n\
             CREATE TABLE IF NOT EXISTS {table} (\n    \
             \"ScriptName\" varchar(255) NOT NULL PRIMARY KEY,\n    \
             \"AppliedAtUtc\" timestamp NOT NULL DEFAULT (now() AT TIME ZONE 'utc')\n);",
            schema = quote_pg(schema)?,
            table = qualify_pg(schema, table)?,
        ))
    }

    fn journal_select_sql(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!(
            "SELECT \"ScriptName\" FROM {} ORDER BY \"ScriptName\"",
            qualify_pg(schema, table)?
        ))
    }

    fn journal_insert_sql(&self, schema: &str, table: &str, script_name: &str) -> Result<String> {
        Ok(format!(
            "INSERT INTO {} (\"ScriptName\", \"AppliedAtUtc\") VALUES ({}, now() AT TIME ZONE 'utc') \
             ON CONFLICT (\"ScriptName\") DO NOTHING",
            qualify_pg(schema, table)?,
            Self::string(script_name)
        ))
    }

    fn select_schema_sql(&self) -> &'static str {
        SELECT_SCHEMA
    }

    fn is_system_schema(&self, schema: &str) -> bool {
        let s = schema.to_lowercase();
        s == "information_schema" || s.starts_with("pg_")
    }

    fn reset_sql(&self, tables: &[&DbTableSchema]) -> Result<String> {
        if tables.is_empty() {
            return Ok(String::new());
        }
        let names = tables
            .iter()
            .map(|t| qualify_pg(&t.schema, &t.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("TRUNCATE TABLE {} RESTART IDENTITY;", names.join(", ")))
    }

    fn data_sql(&self, table: &DataTable, rows: &[RenderedRow]) -> Result<String> {
        let target = qualify_pg(&table.schema, &table.name)?;
        let overriding = table.metadata.columns.iter().any(|c| c.is_identity);
        let mut statements = Vec::with_capacity(rows.len());

        for row in rows {
            let inserted: Vec<&(String, String)> = row
                .cells
                .iter()
                .filter(|(c, _)| table.usage(c) != ColumnUsage::UpdateOnly)
                .collect();

            let mut sql = if inserted.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", target)
            } else {
                let columns = inserted
                    .iter()
                    .map(|(c, _)| quote_pg(c))
                    .collect::<Result<Vec<_>>>()?;
                let values: Vec<&str> = inserted.iter().map(|(_, v)| v.as_str()).collect();
                let inserts_identity = inserted.iter().any(|(c, _)| {
                    table.metadata.column(c).is_some_and(|col| col.is_identity)
                });
                format!(
                    "INSERT INTO {} ({}){} VALUES ({})",
                    target,
                    columns.join(", "),
                    if overriding && inserts_identity { " OVERRIDING SYSTEM VALUE" } else { "" },
                    values.join(", ")
                )
            };

            if table.merge {
                let keys = table
                    .match_columns
                    .iter()
                    .map(|c| {
                        if row.get(c).is_none() {
                            return Err(MigrateError::parse(
                                table.full_name(),
                                format!("merge key column '{}' has no value", c),
                            ));
                        }
                        quote_pg(c)
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut updates = Vec::new();
                for (column, value) in &row.cells {
                    if table.is_match_column(column) {
                        continue;
                    }
                    let quoted = quote_pg(column)?;
                    match table.usage(column) {
                        ColumnUsage::InsertOnly => {}
                        ColumnUsage::UpdateOnly => updates.push(format!("{} = {}", quoted, value)),
                        ColumnUsage::Both => updates.push(format!("{q} = EXCLUDED.{q}", q = quoted)),
                    }
                }

                if updates.is_empty() {
                    sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", keys.join(", ")));
                } else {
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        keys.join(", "),
                        updates.join(", ")
                    ));
                }
            }
            sql.push(';');
            statements.push(sql);
        }
        Ok(statements.join("\n"))
    }

    fn schema_object_pattern(&self) -> &'static Regex {
        &CREATE_OBJECT
    }

    fn drop_object_sql(&self, descriptor: &SchemaObjectDescriptor) -> Result<String> {
        let object_type = descriptor.object_type.as_str();
        if object_type == "trigger" {
            let table = Self::trigger_table(&descriptor.body).ok_or_else(|| {
                MigrateError::parse(
                    descriptor.script.name.clone(),
                    format!("trigger {} has no ON <table> clause", descriptor.name),
                )
            })?;
            let (schema, name) = match table.split_once('.') {
                Some((s, n)) => (unquote(s), unquote(n)),
                None => (descriptor.schema.clone(), unquote(&table)),
            };
            return Ok(format!(
                "DROP TRIGGER IF EXISTS {} ON {}",
                quote_pg(&descriptor.name)?,
                qualify_pg(&schema, &name)?
            ));
        }
        Ok(format!(
            "DROP {} IF EXISTS {}",
            object_type.to_uppercase(),
            qualify_pg(&descriptor.schema, &descriptor.name)?
        ))
    }

    fn script_template(&self, template: ScriptTemplate, schema: &str, table: &str) -> Result<String> {
        let body = match template {
            ScriptTemplate::Default => "-- Migration script\n\n".to_string(),
            ScriptTemplate::Schema => format!("CREATE SCHEMA IF NOT EXISTS {};\n", quote_pg(schema)?),
            ScriptTemplate::Create => format!(
                "CREATE TABLE {qualified} (\n    \
                 {id} uuid NOT NULL PRIMARY KEY,\n    \
                 \"CreatedBy\" varchar(250) NULL,\n    \
                 \"CreatedDate\" timestamp with time zone NULL,\n    \
                 \"UpdatedBy\" varchar(250) NULL,\n    \
                 \"UpdatedDate\" timestamp with time zone NULL\n);\n",
                qualified = qualify_pg(schema, table)?,
                id = quote_pg(&format!("{}Id", table))?,
            ),
            ScriptTemplate::RefData => format!(
                "CREATE TABLE {qualified} (\n    \
                 {id} integer GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,\n    \
                 \"Code\" varchar(50) NOT NULL UNIQUE,\n    \
                 \"Text\" varchar(250) NOT NULL,\n    \
                 \"IsActive\" boolean NOT NULL DEFAULT TRUE,\n    \
                 \"SortOrder\" integer NOT NULL DEFAULT 0\n);\n",
                qualified = qualify_pg(schema, table)?,
                id = quote_pg(&format!("{}Id", table))?,
            ),
            ScriptTemplate::Alter => format!(
                "ALTER TABLE {}\n    ADD COLUMN \"NewColumn\" varchar(100) NULL;\n",
                qualify_pg(schema, table)?
            ),
        };
        Ok(body)
    }
}
