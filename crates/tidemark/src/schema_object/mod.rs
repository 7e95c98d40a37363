//! Schema objects: views, functions, procedures, types and triggers.
//!
//! Each schema script is parsed into a [`SchemaObjectDescriptor`] from its
//! leading `CREATE` statement. The [`SchemaObjectManager`] then drops what
//! cannot be replaced in place and recreates everything, in dependency order.

mod manager;

pub use manager::{SchemaObjectManager, SchemaObjectOptions, SchemaObjectSummary};

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::core::identifier::unquote;
use crate::core::traits::Dialect;
use crate::script::ScriptSource;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("valid line comment regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A schema object parsed from one script.
#[derive(Debug, Clone)]
pub struct SchemaObjectDescriptor {
    pub script: ScriptSource,
    /// Script body; executed unchanged in the create pass.
    pub body: String,
    /// Lower-case type keyword (`view`, `procedure`, ...).
    pub object_type: String,
    pub schema: String,
    pub name: String,
    pub type_order: usize,
    pub schema_order: usize,
    pub supports_replace: bool,
    pub drop_statement: String,
    /// Leading `CREATE ...` clause, for logging.
    pub create_statement: String,
    pub error: Option<String>,
}

impl SchemaObjectDescriptor {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Parse a script body against the dialect's `CREATE` pattern.
    pub fn parse(
        script: ScriptSource,
        body: String,
        dialect: &dyn Dialect,
        options: &SchemaObjectOptions,
    ) -> Self {
        let mut descriptor = Self {
            script,
            body,
            object_type: String::new(),
            schema: String::new(),
            name: String::new(),
            type_order: usize::MAX,
            schema_order: usize::MAX,
            supports_replace: false,
            drop_statement: String::new(),
            create_statement: String::new(),
            error: None,
        };

        let stripped = strip_comments(&descriptor.body);
        let Some(caps) = dialect.schema_object_pattern().captures(&stripped) else {
            descriptor.error = Some("no CREATE statement found".to_string());
            return descriptor;
        };

        descriptor.create_statement = WHITESPACE
            .replace_all(caps.get(0).map(|m| m.as_str()).unwrap_or("").trim(), " ")
            .into_owned();
        descriptor.supports_replace = caps.name("replace").is_some();
        descriptor.object_type = normalize_type(caps.name("type").map(|m| m.as_str()).unwrap_or(""));
        descriptor.schema = caps
            .name("schema")
            .map(|m| unquote(m.as_str()))
            .unwrap_or_else(|| dialect.default_schema().to_string());
        descriptor.name = caps.name("name").map(|m| unquote(m.as_str())).unwrap_or_default();

        match options
            .supported_types
            .iter()
            .position(|t| normalize_type(t) == descriptor.object_type)
        {
            Some(index) => descriptor.type_order = index,
            None => {
                descriptor.error = Some(format!(
                    "object type '{}' is not supported (supported: {})",
                    descriptor.object_type,
                    options.supported_types.join(", ")
                ));
                return descriptor;
            }
        }

        descriptor.schema_order = options
            .schema_order
            .iter()
            .position(|s| s.eq_ignore_ascii_case(&descriptor.schema))
            .unwrap_or(options.schema_order.len());

        match dialect.drop_object_sql(&descriptor) {
            Ok(sql) => descriptor.drop_statement = sql,
            Err(e) => descriptor.error = Some(e.to_string()),
        }
        descriptor
    }

    /// Creation order: schema priority, type priority, schema, name.
    pub fn create_order(&self, other: &Self) -> Ordering {
        self.schema_order
            .cmp(&other.schema_order)
            .then(self.type_order.cmp(&other.type_order))
            .then_with(|| self.schema.to_lowercase().cmp(&other.schema.to_lowercase()))
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
    }

    pub fn is_must_drop(&self, options: &SchemaObjectOptions) -> bool {
        options
            .must_drop_types
            .iter()
            .any(|t| normalize_type(t) == self.object_type)
    }
}

/// Remove block and line comments.
pub(crate) fn strip_comments(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, " ");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Lower-case, single-spaced type keyword; `proc` is `procedure`.
pub fn normalize_type(raw: &str) -> String {
    let lower = WHITESPACE.replace_all(raw.trim(), " ").to_lowercase();
    match lower.as_str() {
        "proc" => "procedure".to_string(),
        _ => lower,
    }
}
