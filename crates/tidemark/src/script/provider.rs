//! Resource providers and ordered script discovery.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::ScriptSource;
use crate::error::{MigrateError, Result};

/// Where a provider's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    FileSystem,
    Embedded,
}

/// A container of named scripts.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Scripts under `namespace` with one of `extensions`, ordered by name.
    async fn list(&self, namespace: &str, extensions: &[&str]) -> Result<Vec<ScriptSource>>;
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext.to_lowercase())))
}

/// Scripts on disk under `<root>/<namespace>/`, searched recursively.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    name: String,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { root, name }
    }

    /// Like [`DirectoryProvider::new`], but the root must exist.
    pub fn existing(root: impl Into<PathBuf>) -> Result<Self> {
        let provider = Self::new(root);
        if !provider.root.is_dir() {
            return Err(MigrateError::discovery(
                provider.name.clone(),
                "resource directory does not exist",
            ));
        }
        Ok(provider)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ResourceProvider for DirectoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::FileSystem
    }

    async fn list(&self, namespace: &str, extensions: &[&str]) -> Result<Vec<ScriptSource>> {
        let base = self.root.join(namespace);
        if !tokio::fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut pending = vec![base];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if has_extension(&relative, extensions) {
                    found.push(ScriptSource::from_file(relative, path));
                }
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

/// Scripts bundled into the application, e.g. via `include_str!`.
#[derive(Debug, Clone)]
pub struct EmbeddedProvider {
    name: String,
    entries: Vec<(String, Arc<str>)>,
}

impl EmbeddedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Add a script named by its namespace-relative path, e.g. `Migrations/001.sql`.
    pub fn with(mut self, name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        self.entries.push((name.into(), content.into()));
        self
    }

    pub fn from_static(name: impl Into<String>, entries: &[(&str, &'static str)]) -> Self {
        entries
            .iter()
            .fold(Self::new(name), |p, (n, c)| p.with(*n, *c))
    }
}

#[async_trait]
impl ResourceProvider for EmbeddedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Embedded
    }

    async fn list(&self, namespace: &str, extensions: &[&str]) -> Result<Vec<ScriptSource>> {
        let prefix = format!("{}/", namespace.to_lowercase());
        let mut found: Vec<ScriptSource> = self
            .entries
            .iter()
            .filter(|(n, _)| n.to_lowercase().starts_with(&prefix) && has_extension(n, extensions))
            .map(|(n, c)| {
                ScriptSource::from_text(n.clone(), c.clone()).with_tag(format!("{}:{}", self.name, n))
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

/// An immutable, priority-ordered list of providers.
#[derive(Clone, Default)]
pub struct ScriptCatalog {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl ScriptCatalog {
    pub fn new(providers: Vec<Arc<dyn ResourceProvider>>) -> Self {
        Self { providers }
    }

    /// One directory provider per path, in the given order.
    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        Self::new(
            dirs.iter()
                .map(|d| Arc::new(DirectoryProvider::new(d.clone())) as Arc<dyn ResourceProvider>)
                .collect(),
        )
    }

    pub fn providers(&self) -> &[Arc<dyn ResourceProvider>] {
        &self.providers
    }

    /// Probe providers in priority order.
    ///
    /// The first occurrence of a name wins, except that a file-system script
    /// always replaces a bundled script of the same name.
    pub async fn discover(&self, namespace: &str, extensions: &[&str]) -> Result<Vec<ScriptSource>> {
        let mut found: Vec<(ProviderKind, ScriptSource)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for provider in &self.providers {
            let kind = provider.kind();
            for script in provider.list(namespace, extensions).await? {
                let key = script.name.to_lowercase();
                match index.get(&key) {
                    Some(&i) => {
                        if found[i].0 == ProviderKind::Embedded && kind == ProviderKind::FileSystem {
                            debug!("{} overrides bundled {}", script.tag, found[i].1.tag);
                            found[i] = (kind, script);
                        }
                    }
                    None => {
                        index.insert(key, found.len());
                        found.push((kind, script));
                    }
                }
            }
        }

        debug!("Discovered {} {} script(s)", found.len(), namespace);
        Ok(found.into_iter().map(|(_, s)| s).collect())
    }
}
