//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing connection string, invalid command, bad YAML values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required script or template resource could not be found
    #[error("Discovery failed for {namespace}: {message}")]
    Discovery { namespace: String, message: String },

    /// Malformed data document, schema object script, or runtime token
    #[error("Parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// A script or statement failed against the database
    #[error("Execution failed for {script}: {message}")]
    Execution { script: String, message: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A before/after phase hook refused to continue
    #[error("Migration halted by hook at phase {phase}")]
    Vetoed { phase: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Discovery error
    pub fn discovery(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Discovery {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Create a Parse error naming the offending document, script or table
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an Execution error for a named script
    pub fn execution(script: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Execution {
            script: script.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a driver-level failure with the name of the script being executed.
    pub fn in_script(self, script: &str) -> Self {
        match self {
            MigrateError::Cancelled => self,
            MigrateError::Execution { message, .. } => MigrateError::Execution {
                script: script.to_string(),
                message,
            },
            other => MigrateError::Execution {
                script: script.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::Discovery { .. } => 3,
            MigrateError::Parse { .. } | MigrateError::Yaml(_) | MigrateError::Json(_) => 4,
            MigrateError::Execution { .. }
            | MigrateError::Postgres(_)
            | MigrateError::SqlServer(_)
            | MigrateError::Pool { .. } => 5,
            MigrateError::Vetoed { .. } => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::discovery("Data", "x").exit_code(), 3);
        assert_eq!(MigrateError::parse("a.yaml", "x").exit_code(), 4);
        assert_eq!(MigrateError::execution("a.sql", "x").exit_code(), 5);
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_in_script_names_the_failing_script() {
        let io = MigrateError::Io(std::io::Error::other("boom"));
        match io.in_script("001.sql") {
            MigrateError::Execution { script, message } => {
                assert_eq!(script, "001.sql");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            MigrateError::Cancelled.in_script("001.sql"),
            MigrateError::Cancelled
        ));
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::parse("refdata.yaml", "unknown column 'Colour'");
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Parse error in refdata.yaml"));
    }
}
