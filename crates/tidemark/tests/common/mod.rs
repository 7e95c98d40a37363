//! Shared fakes for library integration tests.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, Mutex};

use tidemark::config::ConventionConfig;
use tidemark::core::{Connector, Database, DbRow, DbTableSchema, Dialect};
use tidemark::Result;

/// In-memory target: records statements, keeps a journal, and reports a
/// fixed set of tables on introspection.
pub struct FakeDatabase {
    executed: Mutex<Vec<String>>,
    journal: Mutex<Vec<String>>,
    tables: Vec<DbTableSchema>,
    journal_insert: Regex,
}

impl FakeDatabase {
    pub fn new(tables: Vec<DbTableSchema>) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            tables,
            journal_insert: Regex::new(r"INSERT INTO .*SchemaJournal.*VALUES \(N?'([^']*)'").unwrap(),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Index of the first executed statement containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.executed().iter().position(|s| s.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.executed().iter().filter(|s| s.contains(needle)).count()
    }

    fn record(&self, sql: &str) {
        self.executed.lock().unwrap().push(sql.to_string());
        for line in sql.lines() {
            if let Some(caps) = self.journal_insert.captures(line) {
                self.journal.lock().unwrap().push(caps[1].to_string());
            }
        }
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql);
        Ok(1)
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.record(sql);
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        if sql.contains("SchemaJournal") {
            return Ok(self
                .journal()
                .into_iter()
                .map(|name| DbRow::new(vec!["ScriptName".into()], vec![Some(name)]))
                .collect());
        }
        Ok(Vec::new())
    }

    async fn select_schema(
        &self,
        _dialect: &dyn Dialect,
        conventions: &ConventionConfig,
    ) -> Result<Vec<DbTableSchema>> {
        let mut tables = self.tables.clone();
        for table in &mut tables {
            table.apply_conventions(conventions);
        }
        Ok(tables)
    }

    fn db_type(&self) -> &str {
        "fake"
    }
}

/// Connector handing out the same fake for target and admin connections.
pub struct FakeConnector {
    pub db: Arc<FakeDatabase>,
}

#[async_trait]
impl Connector for FakeConnector {
    fn database_name(&self) -> &str {
        "demo"
    }

    async fn connect(&self) -> Result<Arc<dyn Database>> {
        Ok(self.db.clone())
    }

    async fn connect_admin(&self) -> Result<Arc<dyn Database>> {
        Ok(self.db.clone())
    }
}
