//! Deferred `^(Name)` runtime values.
//!
//! Tokens are captured at parse time and resolved when statements are
//! generated, against a closed registry: built-in names, caller parameters
//! and caller-registered resolvers. Anything else is an error.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

use crate::config::DataConfig;
use crate::core::value::SqlValue;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^\((?P<name>[^()]+)\)$").expect("valid runtime token regex"));

/// Name inside a `^(Name)` token, if the string is one.
pub fn runtime_token(value: &str) -> Option<&str> {
    TOKEN
        .captures(value.trim())
        .and_then(|c| c.name("name"))
        .map(|m| m.as_str().trim())
}

pub type Resolver = Arc<dyn Fn() -> SqlValue + Send + Sync>;

pub const USER_NAME: &str = "UserName";
pub const DATE_TIME_NOW: &str = "DateTimeNow";
pub const DATE_NOW: &str = "DateNow";
pub const NEW_GUID: &str = "NewGuid";

/// Registry of resolvable runtime names (case-insensitive).
#[derive(Clone)]
pub struct RuntimeValues {
    parameters: BTreeMap<String, String>,
    resolvers: HashMap<String, Resolver>,
}

impl fmt::Debug for RuntimeValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("RuntimeValues")
            .field("parameters", &self.parameters)
            .field("resolvers", &names)
            .finish()
    }
}

impl RuntimeValues {
    /// Built-in names with a fixed user and timestamp for the whole run.
    pub fn new(user_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let user = user_name.into();
        let mut values = Self {
            parameters: BTreeMap::new(),
            resolvers: HashMap::new(),
        };
        values.register(USER_NAME, move || SqlValue::Text(user.clone()));
        values.register(DATE_TIME_NOW, move || SqlValue::DateTimeOffset(now.fixed_offset()));
        values.register(DATE_NOW, move || SqlValue::Date(now.date_naive()));
        values.register(NEW_GUID, || SqlValue::Uuid(Uuid::new_v4()));
        values
    }

    pub fn from_config(config: &DataConfig) -> Self {
        let user = config.user_name.clone().unwrap_or_else(whoami::username);
        Self::new(user, Utc::now()).with_parameters(&config.parameters)
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn with_parameters(self, parameters: &BTreeMap<String, String>) -> Self {
        parameters
            .iter()
            .fold(self, |values, (k, v)| values.with_parameter(k.clone(), v.clone()))
    }

    /// Add or replace a named resolver.
    pub fn register<F>(&mut self, name: &str, resolver: F)
    where
        F: Fn() -> SqlValue + Send + Sync + 'static,
    {
        self.resolvers.insert(name.to_lowercase(), Arc::new(resolver));
    }

    /// Caller parameters take precedence over resolvers.
    pub fn resolve(&self, name: &str) -> Option<SqlValue> {
        let key = name.to_lowercase();
        if let Some(value) = self.parameters.get(&key) {
            return Some(SqlValue::Text(value.clone()));
        }
        self.resolvers.get(&key).map(|resolver| resolver())
    }
}
