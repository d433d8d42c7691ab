//! SQLite-backed network store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::NetworkStore;
use crate::access::ListKind;
use crate::error::Result;

/// Stores each list in its own table, one canonical CIDR per row.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database file and its tables.
    ///
    /// SQLite has a single writer, so the pool keeps one connection.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        info!(path = %path.as_ref().display(), "Connected to SQLite storage");
        Self::with_pool(pool).await
    }

    /// A private in-memory database, gone when the store is dropped.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // The database lives and dies with its only connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for list in [ListKind::Whitelist, ListKind::Blacklist] {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (net TEXT NOT NULL PRIMARY KEY)",
                list.table()
            );
            sqlx::query(&sql).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl NetworkStore for SqliteStore {
    async fn insert(&self, list: ListKind, network: &str) -> Result<()> {
        let sql = format!("INSERT INTO {} (net) VALUES (?1)", list.table());
        sqlx::query(&sql).bind(network).execute(&self.pool).await?;
        debug!(%list, network, "Inserted network");
        Ok(())
    }

    async fn delete(&self, list: ListKind, network: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE net = ?1", list.table());
        let result = sqlx::query(&sql).bind(network).execute(&self.pool).await?;
        debug!(%list, network, rows = result.rows_affected(), "Deleted network");
        Ok(())
    }

    async fn networks(&self, list: ListKind) -> Result<Vec<String>> {
        let sql = format!("SELECT net FROM {} ORDER BY rowid", list.table());
        let networks = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(networks)
    }
}
