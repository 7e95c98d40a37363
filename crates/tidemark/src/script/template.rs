//! New migration script generation (the `script` command).

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::MIGRATIONS_NAMESPACE;
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// Kind of script body to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// Empty script with a header comment.
    Default,
    /// `CREATE TABLE` skeleton.
    Create,
    /// `ALTER TABLE` skeleton.
    Alter,
    /// Reference-data table (code, text, is-active, sort-order).
    RefData,
    /// `CREATE SCHEMA`.
    Schema,
}

impl ScriptTemplate {
    pub const NAMES: [&'static str; 5] = ["default", "create", "alter", "refdata", "schema"];

    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "default" => Ok(ScriptTemplate::Default),
            "create" => Ok(ScriptTemplate::Create),
            "alter" => Ok(ScriptTemplate::Alter),
            "refdata" => Ok(ScriptTemplate::RefData),
            "schema" => Ok(ScriptTemplate::Schema),
            other => Err(MigrateError::discovery(
                "script templates",
                format!(
                    "no template named '{}'. Available: {}",
                    other,
                    Self::NAMES.join(", ")
                ),
            )),
        }
    }

    /// Whether the template needs a table name in addition to the schema.
    pub fn needs_table(&self) -> bool {
        matches!(
            self,
            ScriptTemplate::Create | ScriptTemplate::Alter | ScriptTemplate::RefData
        )
    }

    fn description(&self, schema: &str, table: &str) -> String {
        let raw = match self {
            ScriptTemplate::Default => "migration".to_string(),
            ScriptTemplate::Create | ScriptTemplate::RefData => format!("create-{schema}-{table}"),
            ScriptTemplate::Alter => format!("alter-{schema}-{table}"),
            ScriptTemplate::Schema => format!("create-{schema}-schema"),
        };
        raw.to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect()
    }
}

/// Write a new script under `<output>/Migrations/`.
///
/// Returns the path written; an existing file is never overwritten.
pub fn create_script(
    dialect: &dyn Dialect,
    output_dir: &Path,
    template: ScriptTemplate,
    schema: Option<&str>,
    table: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let schema = schema.unwrap_or_else(|| dialect.default_schema());
    let table = match (template.needs_table(), table) {
        (true, Some(t)) => t,
        (true, None) => {
            return Err(MigrateError::Config(format!(
                "the '{:?}' script template requires a table name",
                template
            )))
        }
        (false, t) => t.unwrap_or(""),
    };

    let body = dialect.script_template(template, schema, table)?;
    let dir = output_dir.join(MIGRATIONS_NAMESPACE);
    std::fs::create_dir_all(&dir)?;

    let file_name = format!(
        "{}-{}.sql",
        now.format("%Y%m%d-%H%M%S"),
        template.description(schema, table)
    );
    let path = dir.join(file_name);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => MigrateError::Config(format!(
                "script {} already exists",
                path.display()
            )),
            _ => MigrateError::Io(e),
        })?;
    file.write_all(body.as_bytes())?;

    info!("Created script {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::postgres::PostgresDialect;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 0).unwrap()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(ScriptTemplate::parse("RefData").unwrap(), ScriptTemplate::RefData);
        assert!(matches!(
            ScriptTemplate::parse("nope"),
            Err(MigrateError::Discovery { .. })
        ));
    }

    #[test]
    fn test_create_script_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_script(
            &PostgresDialect::new(),
            dir.path(),
            ScriptTemplate::Create,
            Some("Demo"),
            Some("Person"),
            fixed_now(),
        )
        .unwrap();

        assert!(path.ends_with("Migrations/20240501-134500-create-demo-person.sql"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("CREATE TABLE \"Demo\".\"Person\""));
    }

    #[test]
    fn test_create_script_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dialect = PostgresDialect::new();
        create_script(&dialect, dir.path(), ScriptTemplate::Default, None, None, fixed_now()).unwrap();
        let second =
            create_script(&dialect, dir.path(), ScriptTemplate::Default, None, None, fixed_now());
        assert!(matches!(second, Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_table_required() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_script(
            &PostgresDialect::new(),
            dir.path(),
            ScriptTemplate::Alter,
            Some("Demo"),
            None,
            fixed_now(),
        );
        assert!(result.is_err());
    }
}
