//! In-memory database double for unit tests.

use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::ConventionConfig;
use crate::core::schema::DbTableSchema;
use crate::core::traits::{Database, DbRow, Dialect};
use crate::error::{MigrateError, Result};

/// Records every statement and optionally emulates the journal table.
#[derive(Default)]
pub struct RecordingDatabase {
    executed: Mutex<Vec<String>>,
    journal: Mutex<Vec<String>>,
    emulate_journal: bool,
    fail_on: Option<String>,
    tables: Vec<DbTableSchema>,
    scalars: Vec<(String, String)>,
    introspections: AtomicUsize,
}

impl RecordingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal_emulation(mut self) -> Self {
        self.emulate_journal = true;
        self
    }

    /// Fail any statement containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn with_tables(mut self, tables: Vec<DbTableSchema>) -> Self {
        self.tables = tables;
        self
    }

    /// Answer any query containing `needle` with one single-column row.
    pub fn with_scalar(mut self, needle: &str, value: &str) -> Self {
        self.scalars.push((needle.to_string(), value.to_string()));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn introspections(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    pub fn journal_inserts(&self) -> usize {
        self.journal.lock().unwrap().len()
    }

    fn run(&self, sql: &str) -> Result<()> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::execution("statement", format!("syntax error near {needle}")));
            }
        }
        self.executed.lock().unwrap().push(sql.to_string());

        if self.emulate_journal && sql.contains("INSERT INTO") && sql.contains("SchemaJournal") {
            let re = Regex::new(r"VALUES \(N?'([^']*)'").unwrap();
            if let Some(caps) = re.captures(sql) {
                self.journal.lock().unwrap().push(caps[1].to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.run(sql)?;
        Ok(1)
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.run(sql)
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        if self.emulate_journal && sql.contains("SchemaJournal") {
            return Ok(self
                .journal
                .lock()
                .unwrap()
                .iter()
                .map(|name| DbRow::new(vec!["ScriptName".into()], vec![Some(name.clone())]))
                .collect());
        }
        Ok(self
            .scalars
            .iter()
            .filter(|(needle, _)| sql.contains(needle.as_str()))
            .take(1)
            .map(|(_, value)| DbRow::new(vec!["value".into()], vec![Some(value.clone())]))
            .collect())
    }

    async fn select_schema(
        &self,
        _dialect: &dyn Dialect,
        conventions: &ConventionConfig,
    ) -> Result<Vec<DbTableSchema>> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.clone();
        for table in &mut tables {
            table.apply_conventions(conventions);
        }
        Ok(tables)
    }

    fn db_type(&self) -> &str {
        "recording"
    }
}
