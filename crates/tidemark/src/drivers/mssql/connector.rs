//! SQL Server connections over Tiberius with bb8 pooling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{Client, ColumnData, Config as TdsConfig, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::core::traits::{Connector, Database, DbRow};
use crate::error::{MigrateError, Result};

/// Timeout for acquiring a pooled connection.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const POOL_SIZE: u32 = 2;

/// ADO keys that name the database.
const DATABASE_KEYS: [&str; 2] = ["database", "initial catalog"];

/// bb8 manager for Tiberius connections.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: TdsConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: TdsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let tcp = TcpStream::connect(self.config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        tcp.set_nodelay(true).ok();
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// One SQL Server database.
pub struct MssqlDatabase {
    pool: Pool<TiberiusConnectionManager>,
    database: String,
}

impl MssqlDatabase {
    async fn conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting SQL Server connection to {}", self.database)))
    }
}

#[async_trait]
impl Database for MssqlDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let result = conn.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        let mut conn = self.conn().await?;
        let rows = conn.simple_query(sql).await?.into_first_result().await?;
        debug!("Query returned {} row(s)", rows.len());
        Ok(rows.into_iter().map(to_db_row).collect())
    }

    fn db_type(&self) -> &str {
        "mssql"
    }
}

fn to_db_row(row: Row) -> DbRow {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = row.into_iter().map(column_text).collect();
    DbRow::new(columns, values)
}

/// Text form of a column value. Binary and temporal columns read as NULL;
/// journal and catalog queries only select character and numeric data.
fn column_text(data: ColumnData<'static>) -> Option<String> {
    match data {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|b| if b { "1" } else { "0" }.to_string()),
        ColumnData::String(v) => v.map(|s| s.into_owned()),
        ColumnData::Guid(v) => v.map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()),
        _ => None,
    }
}

/// Opens the target database and `master`.
pub struct SqlServerConnector {
    config: TdsConfig,
    database: String,
    admin_database: String,
}

impl SqlServerConnector {
    /// Parse an ADO.NET style connection string.
    pub fn new(connection_string: &str, admin_database: &str) -> Result<Self> {
        let config = TdsConfig::from_ado_string(connection_string).map_err(|e| {
            MigrateError::Config(format!("Invalid SQL Server connection string: {}", e))
        })?;
        let database = ado_value(connection_string, &DATABASE_KEYS).ok_or_else(|| {
            MigrateError::Config(
                "SQL Server connection string names no database (Database or Initial Catalog)".into(),
            )
        })?;

        Ok(Self {
            config,
            database,
            admin_database: admin_database.to_string(),
        })
    }

    async fn open(&self, database: &str) -> Result<Arc<dyn Database>> {
        let mut config = self.config.clone();
        config.database(database);

        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .build(TiberiusConnectionManager::new(config))
            .await
            .map_err(|e| MigrateError::pool(e, format!("connecting to SQL Server database {}", database)))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| MigrateError::pool(e, "testing SQL Server connection"))?;
            conn.simple_query("SELECT 1").await?.into_results().await?;
        }
        info!("Connected to SQL Server database {}", database);

        Ok(Arc::new(MssqlDatabase {
            pool,
            database: database.to_string(),
        }))
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn connect(&self) -> Result<Arc<dyn Database>> {
        self.open(&self.database).await
    }

    async fn connect_admin(&self) -> Result<Arc<dyn Database>> {
        self.open(&self.admin_database).await
    }
}

/// First non-empty value for any of `keys` in a `key=value;` string.
fn ado_value(connection_string: &str, keys: &[&str]) -> Option<String> {
    connection_string
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| keys.iter().any(|k| key.trim().eq_ignore_ascii_case(k)))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ado_value_lookup() {
        let cs = "Server=tcp:localhost,1433;Initial Catalog=Shop;User Id=sa;Password=x";
        assert_eq!(ado_value(cs, &DATABASE_KEYS).as_deref(), Some("Shop"));

        let cs = "server=localhost; database = 'Demo' ;";
        assert_eq!(ado_value(cs, &DATABASE_KEYS).as_deref(), Some("Demo"));

        assert_eq!(ado_value("Server=localhost;Database=", &DATABASE_KEYS), None);
    }

    #[test]
    fn test_connector_requires_database() {
        let err = SqlServerConnector::new("Server=localhost;User Id=sa;Password=x", "master")
            .err()
            .unwrap();
        assert!(err.to_string().contains("Initial Catalog"));

        let ok = SqlServerConnector::new(
            "Server=localhost;Database=Demo;User Id=sa;Password=x;TrustServerCertificate=true",
            "master",
        )
        .unwrap();
        assert_eq!(ok.database_name(), "Demo");
    }
}
