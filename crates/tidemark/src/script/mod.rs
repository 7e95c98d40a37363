//! Script sources and discovery.
//!
//! A [`ScriptSource`] is a named unit of SQL (or seed data) plus the
//! scheduling metadata the journal needs. Content is read lazily so that
//! discovery never loads scripts that end up skipped.

pub mod provider;
pub mod template;

pub use provider::{DirectoryProvider, EmbeddedProvider, ProviderKind, ResourceProvider, ScriptCatalog};
pub use template::ScriptTemplate;

use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Group for `*.pre.deploy.*` scripts; always run.
pub const PRE_DEPLOY_GROUP: i32 = 1;
/// Group for ordinary, journaled migration scripts.
pub const DEFAULT_GROUP: i32 = 2;
/// Group for `*.post.deploy.*` scripts; always run.
pub const POST_DEPLOY_GROUP: i32 = 3;

/// Namespaces probed for each phase.
pub const MIGRATIONS_NAMESPACE: &str = "Migrations";
pub const SCHEMA_NAMESPACE: &str = "Schema";
pub const DATA_NAMESPACE: &str = "Data";

/// Marker for scripts run right after the database is created.
pub const POST_CREATE_MARKER: &str = ".post.database.create.";

#[derive(Debug, Clone)]
enum ScriptContent {
    Text(Arc<str>),
    File(PathBuf),
}

/// A named unit of SQL text with scheduling metadata.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub name: String,
    pub group_order: i32,
    pub run_always: bool,
    /// Provenance (file path, bundle name, or "synthetic").
    pub tag: String,
    content: ScriptContent,
}

impl ScriptSource {
    /// A script whose content is held in memory.
    pub fn from_text(name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            group_order: DEFAULT_GROUP,
            run_always: false,
            tag: "synthetic".to_string(),
            content: ScriptContent::Text(text.into()),
        }
    }

    /// A script read from disk when first executed.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            group_order: DEFAULT_GROUP,
            run_always: false,
            tag: path.display().to_string(),
            content: ScriptContent::File(path),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_group_order(mut self, group_order: i32) -> Self {
        self.group_order = group_order;
        self
    }

    pub fn run_always(mut self) -> Self {
        self.run_always = true;
        self
    }

    /// Apply the migration naming convention: pre/post deploy scripts get
    /// their own group and are never journaled.
    pub fn with_deploy_convention(mut self) -> Self {
        self.group_order = group_order_for(&self.name);
        self.run_always = self.group_order != DEFAULT_GROUP;
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.content, ScriptContent::File(_))
    }

    /// Read the script body.
    pub async fn read(&self) -> Result<String> {
        match &self.content {
            ScriptContent::Text(text) => Ok(text.to_string()),
            ScriptContent::File(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

/// Group order from the file name.
pub fn group_order_for(name: &str) -> i32 {
    let lower = name.to_lowercase();
    if lower.contains(".pre.deploy.") {
        PRE_DEPLOY_GROUP
    } else if lower.contains(".post.deploy.") {
        POST_DEPLOY_GROUP
    } else {
        DEFAULT_GROUP
    }
}

pub fn is_post_create(name: &str) -> bool {
    name.to_lowercase().contains(POST_CREATE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_group_order_by_name() {
        assert_eq!(group_order_for("Migrations/001-seed.pre.deploy.sql"), PRE_DEPLOY_GROUP);
        assert_eq!(group_order_for("Migrations/900-grants.POST.deploy.sql"), POST_DEPLOY_GROUP);
        assert_eq!(group_order_for("Migrations/002-create-person.sql"), DEFAULT_GROUP);
    }

    #[test]
    fn test_deploy_convention_sets_run_always() {
        let pre = ScriptSource::from_text("a.pre.deploy.sql", "SELECT 1").with_deploy_convention();
        assert!(pre.run_always);
        let normal = ScriptSource::from_text("b.sql", "SELECT 1").with_deploy_convention();
        assert!(!normal.run_always);
        assert_eq!(normal.group_order, DEFAULT_GROUP);
    }

    #[test]
    fn test_post_create_marker() {
        assert!(is_post_create("Migrations/000-users.post.database.create.sql"));
        assert!(!is_post_create("Migrations/001-create.sql"));
    }

    #[tokio::test]
    async fn test_file_content_is_read_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let script = ScriptSource::from_file("x.sql", file.path());
        write!(file, "CREATE TABLE t (id int)").unwrap();
        assert!(script.is_file());
        assert_eq!(script.read().await.unwrap(), "CREATE TABLE t (id int)");
    }
}
