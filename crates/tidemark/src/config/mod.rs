//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no connection string is configured.
pub const CONNECTION_STRING_ENV: &str = "TIDEMARK_CONNECTION_STRING";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Fill the connection string from the environment when it was not configured.
    pub fn with_env_fallback(mut self) -> Self {
        if self.connection_string.is_none() {
            if let Ok(value) = std::env::var(CONNECTION_STRING_ENV) {
                if !value.trim().is_empty() {
                    self.connection_string = Some(value);
                }
            }
        }
        self
    }

    /// The connection string, or a configuration error naming how to supply it.
    pub fn require_connection_string(&self) -> Result<&str> {
        match self.connection_string.as_deref() {
            Some(cs) if !cs.trim().is_empty() => Ok(cs),
            _ => Err(MigrateError::Config(format!(
                "a connection string is required (config 'connection_string', --connection-string or {})",
                CONNECTION_STRING_ENV
            ))),
        }
    }

    pub fn admin_database(&self) -> &str {
        self.admin_database
            .as_deref()
            .unwrap_or_else(|| self.provider.default_admin_database())
    }

    pub fn journal_schema(&self) -> &str {
        self.journal
            .schema
            .as_deref()
            .unwrap_or_else(|| self.provider.default_schema())
    }

    /// Directories probed for scripts, highest priority first.
    pub fn resource_dirs(&self) -> Vec<PathBuf> {
        if self.resource_dirs.is_empty() {
            vec![self.output_dir.clone()]
        } else {
            self.resource_dirs.clone()
        }
    }

    /// Supported schema object types, in creation order.
    pub fn supported_object_types(&self) -> Vec<String> {
        match &self.schema_objects.supported_types {
            Some(types) => types.iter().map(|t| t.to_lowercase()).collect(),
            None => match self.provider {
                Provider::Postgres => vec!["type", "function", "view", "procedure", "trigger"],
                Provider::SqlServer => vec!["type", "function", "view", "procedure", "trigger"],
            }
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// Object types that always force a full drop/create cycle.
    pub fn must_drop_object_types(&self) -> Vec<String> {
        match &self.schema_objects.must_drop_types {
            Some(types) => types.iter().map(|t| t.to_lowercase()).collect(),
            None => vec!["type".to_string(), "trigger".to_string()],
        }
    }

    /// Apply command-line overrides on top of file configuration.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(provider) = overrides.provider {
            self.provider = Provider::parse(&provider).ok_or_else(|| {
                MigrateError::Config(format!(
                    "unknown provider '{}'. Valid values: postgres, sqlserver",
                    provider
                ))
            })?;
        }
        if let Some(cs) = overrides.connection_string {
            self.connection_string = Some(cs);
        }
        if let Some(order) = overrides.schema_order {
            self.schema_order = order
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(output) = overrides.output_dir {
            self.output_dir = output;
        }
        for param in overrides.params {
            let (key, value) = param.split_once('=').ok_or_else(|| {
                MigrateError::Config(format!(
                    "parameter '{}' must be in key=value form",
                    param
                ))
            })?;
            self.data
                .parameters
                .insert(key.trim().to_string(), value.to_string());
        }
        if overrides.force_drop {
            self.schema_objects.force_drop = true;
        }
        if overrides.verbose {
            self.verbose = true;
        }
        Ok(())
    }
}

/// Command-line values layered over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub connection_string: Option<String>,
    pub schema_order: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub params: Vec<String>,
    pub force_drop: bool,
    pub verbose: bool,
}
