//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};
use std::collections::HashSet;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(cs) = &config.connection_string {
        if cs.trim().is_empty() {
            return Err(MigrateError::Config(
                "connection_string cannot be empty".into(),
            ));
        }
    }

    if let Some(admin) = &config.admin_database {
        validate_identifier(admin)?;
    }

    validate_identifier(&config.journal.table)?;
    if let Some(schema) = &config.journal.schema {
        validate_identifier(schema)?;
    }

    let mut seen = HashSet::new();
    for schema in &config.schema_order {
        validate_identifier(schema)?;
        if !seen.insert(schema.to_lowercase()) {
            return Err(MigrateError::Config(format!(
                "schema_order lists '{}' more than once",
                schema
            )));
        }
    }

    let supported = config.supported_object_types();
    if supported.is_empty() {
        return Err(MigrateError::Config(
            "schema_objects.supported_types cannot be empty".into(),
        ));
    }
    for must_drop in config.must_drop_object_types() {
        if !supported.contains(&must_drop) && config.schema_objects.must_drop_types.is_some() {
            return Err(MigrateError::Config(format!(
                "schema_objects.must_drop_types contains '{}' which is not a supported type",
                must_drop
            )));
        }
    }

    if config.data.id_suffix.is_empty() {
        return Err(MigrateError::Config("data.id_suffix cannot be empty".into()));
    }

    for pattern in &config.reset.exclude {
        if pattern.trim().is_empty() {
            return Err(MigrateError::Config(
                "reset.exclude patterns cannot be empty".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Provider, SchemaObjectConfig};

    fn valid_config() -> Config {
        Config {
            provider: Provider::SqlServer,
            connection_string: Some("Server=tcp:localhost,1433;Database=Demo".into()),
            schema_order: vec!["Ref".into(), "Demo".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_connection_string() {
        let mut config = valid_config();
        config.connection_string = Some("  ".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_schema_order() {
        let mut config = valid_config();
        config.schema_order = vec!["Ref".into(), "ref".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_supported_types() {
        let mut config = valid_config();
        config.schema_objects = SchemaObjectConfig {
            supported_types: Some(vec![]),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_must_drop_type_must_be_supported() {
        let mut config = valid_config();
        config.schema_objects = SchemaObjectConfig {
            supported_types: Some(vec!["view".into()]),
            must_drop_types: Some(vec!["trigger".into()]),
            force_drop: false,
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_journal_table_null_byte() {
        let mut config = valid_config();
        config.journal.table = "bad\0name".into();
        assert!(validate(&config).is_err());
    }
}
