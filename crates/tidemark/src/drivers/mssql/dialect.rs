//! SQL Server SQL dialect (Strategy pattern).
//!
//! Provides SQL Server-specific SQL text: bracket quoting, `N'...'` literals,
//! `GO` batch separation, `MERGE` for insert-or-update and `sys` catalog
//! introspection.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Provider;
use crate::core::identifier::{escape_literal, qualify_mssql, quote_mssql};
use crate::core::schema::DbTableSchema;
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;
use crate::data::{ColumnUsage, DataTable, RenderedRow};
use crate::error::{MigrateError, Result};
use crate::schema_object::SchemaObjectDescriptor;
use crate::script::template::ScriptTemplate;

static GO_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*GO[ \t]*;?[ \t]*\r?$").expect("valid GO separator regex"));

static CREATE_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^\s*create\s+(?P<replace>or\s+alter\s+)?(?P<type>\w+)\s+(?:(?P<schema>\[(?:[^\]]|\]\])+\]|"(?:[^"]|"")+"|\w+)\s*\.\s*)?(?P<name>\[(?:[^\]]|\]\])+\]|"(?:[^"]|"")+"|\w+)"#,
    )
    .expect("valid SQL Server create regex")
});

const SELECT_SCHEMA: &str = r#"
SELECT s.name AS table_schema,
       o.name AS table_name,
       CASE WHEN o.type = 'V' THEN 'true' ELSE 'false' END AS is_view,
       c.name AS column_name,
       CASE WHEN ty.name = 'timestamp' THEN 'rowversion' ELSE ty.name END AS data_type,
       CASE WHEN c.is_nullable = 1 THEN 'true' ELSE 'false' END AS is_nullable,
       CAST(c.max_length AS varchar(10)) AS max_length,
       CAST(c.precision AS varchar(10)) AS numeric_precision,
       CAST(c.scale AS varchar(10)) AS numeric_scale,
       CASE WHEN pk.column_id IS NOT NULL THEN 'true' ELSE 'false' END AS is_primary_key,
       CASE WHEN c.is_identity = 1 THEN 'true' ELSE 'false' END AS is_identity,
       CASE WHEN uq.column_id IS NOT NULL THEN 'true' ELSE 'false' END AS is_unique,
       rs.name AS fk_schema,
       rt.name AS fk_table,
       rc.name AS fk_column
FROM sys.objects o
JOIN sys.schemas s ON s.schema_id = o.schema_id
JOIN sys.columns c ON c.object_id = o.object_id
JOIN sys.types ty ON ty.user_type_id = c.user_type_id
LEFT JOIN (
    SELECT ic.object_id, ic.column_id
    FROM sys.indexes i
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    WHERE i.is_primary_key = 1
) pk ON pk.object_id = o.object_id AND pk.column_id = c.column_id
LEFT JOIN (
    SELECT ic.object_id, ic.column_id
    FROM sys.indexes i
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    WHERE i.is_unique = 1 AND i.is_primary_key = 0
) uq ON uq.object_id = o.object_id AND uq.column_id = c.column_id
LEFT JOIN sys.foreign_key_columns fkc
  ON fkc.parent_object_id = o.object_id AND fkc.parent_column_id = c.column_id
LEFT JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
LEFT JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
LEFT JOIN sys.columns rc
  ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
WHERE o.type IN ('U', 'V') AND o.is_ms_shipped = 0
ORDER BY s.name, o.name, c.column_id
"#;

const SYSTEM_SCHEMAS: &[&str] = &["sys", "information_schema", "guest", "cdc"];

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn string(value: &str) -> String {
        format!("N'{}'", escape_literal(value))
    }

    fn insert_sql(target: &str, columns: &[String], values: &[&str]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            target,
            columns.join(", "),
            values.join(", ")
        )
    }

    fn merge_sql(table: &DataTable, target: &str, row: &RenderedRow) -> Result<String> {
        let mut source = Vec::with_capacity(row.cells.len());
        let mut insert_columns = Vec::new();
        let mut insert_values = Vec::new();
        let mut updates = Vec::new();

        for (column, value) in &row.cells {
            let quoted = quote_mssql(column)?;
            source.push(format!("{} AS {}", value, quoted));
            let usage = table.usage(column);
            if usage != ColumnUsage::UpdateOnly {
                insert_columns.push(quoted.clone());
                insert_values.push(format!("[s].{}", quoted));
            }
            if usage != ColumnUsage::InsertOnly && !table.is_match_column(column) {
                updates.push(format!("[t].{q} = [s].{q}", q = quoted));
            }
        }

        let on = table
            .match_columns
            .iter()
            .map(|c| {
                if row.get(c).is_none() {
                    return Err(MigrateError::parse(
                        table.full_name(),
                        format!("merge key column '{}' has no value", c),
                    ));
                }
                let q = quote_mssql(c)?;
                Ok(format!("[t].{q} = [s].{q}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!(
            "MERGE INTO {} WITH (HOLDLOCK) AS [t]\nUSING (SELECT {}) AS [s]\nON {}",
            target,
            source.join(", "),
            on.join(" AND ")
        );
        if !updates.is_empty() {
            sql.push_str(&format!("\nWHEN MATCHED THEN UPDATE SET {}", updates.join(", ")));
        }
        sql.push_str(&format!(
            "\nWHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
            insert_columns.join(", "),
            insert_values.join(", ")
        ));
        Ok(sql)
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn provider(&self) -> Provider {
        Provider::SqlServer
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(_) => "NULL".to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) | SqlValue::Json(v) => Self::string(v),
            other => other
                .to_text()
                .map(|text| format!("'{}'", escape_literal(&text)))
                .unwrap_or_else(|| "NULL".to_string()),
        }
    }

    fn split_batches(&self, script: &str) -> Vec<String> {
        GO_SEPARATOR
            .split(script)
            .map(str::trim)
            .filter(|batch| !batch.is_empty())
            .map(String::from)
            .collect()
    }

    fn database_exists_sql(&self, database: &str) -> Result<String> {
        quote_mssql(database)?;
        Ok(format!(
            "SELECT 1 FROM sys.databases WHERE name = {}",
            Self::string(database)
        ))
    }

    fn create_database_sql(&self, database: &str) -> Result<String> {
        Ok(format!("CREATE DATABASE {}", quote_mssql(database)?))
    }

    fn drop_database_sql(&self, database: &str) -> Result<String> {
        let quoted = quote_mssql(database)?;
        Ok(format!(
            "IF DB_ID({name}) IS NOT NULL\nBEGIN\n    \
             ALTER DATABASE {quoted} SET SINGLE_USER WITH ROLLBACK IMMEDIATE;\n    \
             DROP DATABASE {quoted};\nEND",
            name = Self::string(database),
        ))
    }

    fn journal_create_sql(&self, schema: &str, table: &str) -> Result<String> {
        let qualified = qualify_mssql(schema, table)?;
        Ok(format!(
            "IF SCHEMA_ID({schema_name}) IS NULL EXEC({create_schema});\n\
             IF OBJECT_ID({object}, N'U') IS NULL\n\
             CREATE TABLE {qualified} (\n    \
             [ScriptName] nvarchar(255) NOT NULL CONSTRAINT {pk} PRIMARY KEY,\n    \
             [AppliedAtUtc] datetime2 NOT NULL DEFAULT SYSUTCDATETIME()\n);",
            schema_name = Self::string(schema),
            create_schema = Self::string(&format!("CREATE SCHEMA {}", quote_mssql(schema)?)),
            object = Self::string(&qualified),
            pk = quote_mssql(&format!("PK_{}", table))?,
        ))
    }

    fn journal_select_sql(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!(
            "SELECT [ScriptName] FROM {} ORDER BY [ScriptName]",
            qualify_mssql(schema, table)?
        ))
    }

    fn journal_insert_sql(&self, schema: &str, table: &str, script_name: &str) -> Result<String> {
        let qualified = qualify_mssql(schema, table)?;
        let name = Self::string(script_name);
        Ok(format!(
            "IF NOT EXISTS (SELECT 1 FROM {qualified} WITH (UPDLOCK, HOLDLOCK) WHERE [ScriptName] = {name})\n\
             INSERT INTO {qualified} ([ScriptName], [AppliedAtUtc]) VALUES ({name}, SYSUTCDATETIME())"
        ))
    }

    fn select_schema_sql(&self) -> &'static str {
        SELECT_SCHEMA
    }

    fn is_system_schema(&self, schema: &str) -> bool {
        let s = schema.to_lowercase();
        SYSTEM_SCHEMAS.contains(&s.as_str()) || s.starts_with("db_")
    }

    fn reset_sql(&self, tables: &[&DbTableSchema]) -> Result<String> {
        if tables.is_empty() {
            return Ok(String::new());
        }
        let names = tables
            .iter()
            .map(|t| qualify_mssql(&t.schema, &t.name))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = String::new();
        for name in &names {
            sql.push_str(&format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL;\n", name));
        }
        for name in &names {
            sql.push_str(&format!("DELETE FROM {};\n", name));
        }
        for name in &names {
            sql.push_str(&format!("ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL;\n", name));
        }
        Ok(sql.trim_end().to_string())
    }

    fn data_sql(&self, table: &DataTable, rows: &[RenderedRow]) -> Result<String> {
        let target = qualify_mssql(&table.schema, &table.name)?;
        let mut statements = Vec::with_capacity(rows.len() + 2);
        let mut identity_insert = false;

        for row in rows {
            identity_insert |= row.cells.iter().any(|(c, _)| {
                table.usage(c) != ColumnUsage::UpdateOnly
                    && table.metadata.column(c).is_some_and(|col| col.is_identity)
            });

            if table.merge {
                statements.push(Self::merge_sql(table, &target, row)?);
            } else {
                let inserted: Vec<&(String, String)> = row
                    .cells
                    .iter()
                    .filter(|(c, _)| table.usage(c) != ColumnUsage::UpdateOnly)
                    .collect();
                if inserted.is_empty() {
                    statements.push(format!("INSERT INTO {} DEFAULT VALUES;", target));
                    continue;
                }
                let columns = inserted
                    .iter()
                    .map(|(c, _)| quote_mssql(c))
                    .collect::<Result<Vec<_>>>()?;
                let values: Vec<&str> = inserted.iter().map(|(_, v)| v.as_str()).collect();
                statements.push(Self::insert_sql(&target, &columns, &values));
            }
        }

        if identity_insert {
            statements.insert(0, format!("SET IDENTITY_INSERT {} ON;", target));
            statements.push(format!("SET IDENTITY_INSERT {} OFF;", target));
        }
        Ok(statements.join("\n"))
    }

    fn schema_object_pattern(&self) -> &'static Regex {
        &CREATE_OBJECT
    }

    fn drop_object_sql(&self, descriptor: &SchemaObjectDescriptor) -> Result<String> {
        Ok(format!(
            "DROP {} IF EXISTS {}",
            descriptor.object_type.to_uppercase(),
            qualify_mssql(&descriptor.schema, &descriptor.name)?
        ))
    }

    fn script_template(&self, template: ScriptTemplate, schema: &str, table: &str) -> Result<String> {
        let body = match template {
            ScriptTemplate::Default => "-- Migration script\n\n".to_string(),
            ScriptTemplate::Schema => format!(
                "IF SCHEMA_ID({}) IS NULL\n    EXEC({});\nGO\n",
                Self::string(schema),
                Self::string(&format!("CREATE SCHEMA {}", quote_mssql(schema)?))
            ),
            ScriptTemplate::Create => format!(
                "CREATE TABLE {qualified} (\n    \
                 {id} uniqueidentifier NOT NULL CONSTRAINT {pk} PRIMARY KEY DEFAULT NEWSEQUENTIALID(),\n    \
                 [CreatedBy] nvarchar(250) NULL,\n    \
                 [CreatedDate] datetimeoffset NULL,\n    \
                 [UpdatedBy] nvarchar(250) NULL,\n    \
                 [UpdatedDate] datetimeoffset NULL,\n    \
                 [RowVersion] rowversion\n);\nGO\n",
                qualified = qualify_mssql(schema, table)?,
                id = quote_mssql(&format!("{}Id", table))?,
                pk = quote_mssql(&format!("PK_{}_{}", schema, table))?,
            ),
            ScriptTemplate::RefData => format!(
                "CREATE TABLE {qualified} (\n    \
                 {id} int IDENTITY(1,1) NOT NULL CONSTRAINT {pk} PRIMARY KEY,\n    \
                 [Code] nvarchar(50) NOT NULL CONSTRAINT {uq} UNIQUE,\n    \
                 [Text] nvarchar(250) NOT NULL,\n    \
                 [IsActive] bit NOT NULL DEFAULT 1,\n    \
                 [SortOrder] int NOT NULL DEFAULT 0\n);\nGO\n",
                qualified = qualify_mssql(schema, table)?,
                id = quote_mssql(&format!("{}Id", table))?,
                pk = quote_mssql(&format!("PK_{}_{}", schema, table))?,
                uq = quote_mssql(&format!("UQ_{}_{}_Code", schema, table))?,
            ),
            ScriptTemplate::Alter => format!(
                "ALTER TABLE {}\n    ADD [NewColumn] nvarchar(100) NULL;\nGO\n",
                qualify_mssql(schema, table)?
            ),
        };
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DbColumnSchema;
    use crate::data::DataRow;

    #[test]
    fn test_split_batches_on_go_lines() {
        let d = SqlServerDialect::new();
        let batches = d.split_batches("SET ANSI_NULLS ON\nGO\nCREATE VIEW v AS SELECT 1\n  go  \n\nGO\nSELECT 2 AS going");
        assert_eq!(
            batches,
            vec!["SET ANSI_NULLS ON", "CREATE VIEW v AS SELECT 1", "SELECT 2 AS going"]
        );
        assert!(d.split_batches("  \nGO\n").is_empty());
    }

    #[test]
    fn test_literals() {
        let d = SqlServerDialect::new();
        assert_eq!(d.literal(&SqlValue::Bool(false)), "0");
        assert_eq!(d.literal(&SqlValue::Text("O'Neil".into())), "N'O''Neil'");
        assert_eq!(d.literal(&SqlValue::Null), "NULL");
    }

    #[test]
    fn test_journal_insert_is_guarded() {
        let sql = SqlServerDialect::new()
            .journal_insert_sql("dbo", "SchemaJournal", "001.sql")
            .unwrap();
        assert!(sql.contains("WITH (UPDLOCK, HOLDLOCK)"));
        assert!(sql.contains("VALUES (N'001.sql', SYSUTCDATETIME())"));
    }

    #[test]
    fn test_drop_database_forces_single_user() {
        let sql = SqlServerDialect::new().drop_database_sql("Demo").unwrap();
        assert!(sql.contains("ALTER DATABASE [Demo] SET SINGLE_USER WITH ROLLBACK IMMEDIATE"));
        assert!(sql.contains("DROP DATABASE [Demo];"));
    }

    fn gender_table(merge: bool) -> DataTable {
        let meta = DbTableSchema::new("Ref", "Gender")
            .with_column(DbColumnSchema::new("GenderId", "int").primary_key().identity())
            .with_column(DbColumnSchema::new("Code", "nvarchar"))
            .with_column(DbColumnSchema::new("Text", "nvarchar"))
            .with_column(DbColumnSchema::new("UpdatedBy", "nvarchar"));
        let mut table = DataTable::new(meta);
        table.merge = merge;
        for c in ["GenderId", "Code", "Text", "UpdatedBy"] {
            table.add_column(c);
        }
        table.rows.push(DataRow::default());
        table.match_columns = vec!["GenderId".into()];
        table
    }

    fn row() -> RenderedRow {
        RenderedRow {
            cells: vec![
                ("GenderId".into(), "1".into()),
                ("Code".into(), "N'F'".into()),
                ("Text".into(), "N'Female'".into()),
                ("UpdatedBy".into(), "N'alice'".into()),
            ],
        }
    }

    #[test]
    fn test_merge_with_identity_insert() {
        let mut table = gender_table(true);
        table.columns[3].usage = ColumnUsage::UpdateOnly;
        let sql = SqlServerDialect::new().data_sql(&table, &[row()]).unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines[0], "SET IDENTITY_INSERT [Ref].[Gender] ON;");
        assert_eq!(lines[1], "MERGE INTO [Ref].[Gender] WITH (HOLDLOCK) AS [t]");
        assert_eq!(
            lines[2],
            "USING (SELECT 1 AS [GenderId], N'F' AS [Code], N'Female' AS [Text], N'alice' AS [UpdatedBy]) AS [s]"
        );
        assert_eq!(lines[3], "ON [t].[GenderId] = [s].[GenderId]");
        assert_eq!(
            lines[4],
            "WHEN MATCHED THEN UPDATE SET [t].[Code] = [s].[Code], [t].[Text] = [s].[Text], [t].[UpdatedBy] = [s].[UpdatedBy]"
        );
        assert_eq!(
            lines[5],
            "WHEN NOT MATCHED THEN INSERT ([GenderId], [Code], [Text]) VALUES ([s].[GenderId], [s].[Code], [s].[Text]);"
        );
        assert_eq!(lines[6], "SET IDENTITY_INSERT [Ref].[Gender] OFF;");
    }

    #[test]
    fn test_plain_insert_without_identity() {
        let mut table = gender_table(false);
        let mut r = row();
        r.cells.remove(0);
        table.rows[0] = DataRow::default();
        let sql = SqlServerDialect::new().data_sql(&table, &[r]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO [Ref].[Gender] ([Code], [Text], [UpdatedBy]) VALUES (N'F', N'Female', N'alice');"
        );
    }

    #[test]
    fn test_reset_disables_constraints_around_deletes() {
        let a = DbTableSchema::new("dbo", "A");
        let sql = SqlServerDialect::new().reset_sql(&[&a]).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE [dbo].[A] NOCHECK CONSTRAINT ALL;\nDELETE FROM [dbo].[A];\nALTER TABLE [dbo].[A] WITH CHECK CHECK CONSTRAINT ALL;"
        );
    }

    #[test]
    fn test_system_schemas() {
        let d = SqlServerDialect::new();
        assert!(d.is_system_schema("sys"));
        assert!(d.is_system_schema("INFORMATION_SCHEMA"));
        assert!(d.is_system_schema("db_owner"));
        assert!(!d.is_system_schema("dbo"));
    }
}
