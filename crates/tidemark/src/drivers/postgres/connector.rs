//! PostgreSQL connections.
//!
//! Uses deadpool-postgres for pooling and the simple query protocol, so
//! multi-statement scripts and DDL run exactly as written.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls, SimpleQueryMessage};
use tracing::{debug, info};

use crate::core::traits::{Connector, Database, DbRow};
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution is sequential; one spare connection covers journal reads.
const POOL_SIZE: usize = 2;

/// One PostgreSQL database.
pub struct PgDatabase {
    pool: Pool,
    database: String,
}

impl PgDatabase {
    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting PostgreSQL connection to {}", self.database)))
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        let messages = client.simple_query(sql).await?;
        Ok(messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum())
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        let client = self.client().await?;
        let messages = client.simple_query(sql).await?;
        let rows = messages
            .into_iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => {
                    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    let values = (0..row.len()).map(|i| row.get(i).map(String::from)).collect();
                    Some(DbRow::new(columns, values))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        debug!("Query returned {} row(s)", rows.len());
        Ok(rows)
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

/// Opens the target database and the admin (`postgres`) database.
pub struct PostgresConnector {
    config: PgConfig,
    database: String,
    admin_database: String,
}

impl PostgresConnector {
    /// Parse a keyword/value or URL connection string.
    pub fn new(connection_string: &str, admin_database: &str) -> Result<Self> {
        let mut config: PgConfig = connection_string.parse().map_err(|e| {
            MigrateError::Config(format!("Invalid PostgreSQL connection string: {}", e))
        })?;
        if config.get_connect_timeout().is_none() {
            config.connect_timeout(CONNECT_TIMEOUT);
        }
        let database = config
            .get_dbname()
            .or_else(|| config.get_user())
            .map(String::from)
            .ok_or_else(|| {
                MigrateError::Config("PostgreSQL connection string names no database (dbname)".into())
            })?;

        Ok(Self {
            config,
            database,
            admin_database: admin_database.to_string(),
        })
    }

    async fn open(&self, mut pg_config: PgConfig, database: &str) -> Result<Arc<dyn Database>> {
        pg_config.dbname(database);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = match TlsBuilder::for_config(&pg_config).build() {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("connecting to PostgreSQL database {}", database)))?;
        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL database {}", database);

        Ok(Arc::new(PgDatabase {
            pool,
            database: database.to_string(),
        }))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn connect(&self) -> Result<Arc<dyn Database>> {
        self.open(self.config.clone(), &self.database).await
    }

    async fn connect_admin(&self) -> Result<Arc<dyn Database>> {
        self.open(self.config.clone(), &self.admin_database).await
    }
}
