//! Database connection management: pooling, migrations, health checks.
//!
//! Ground: teacher's `db::connection::DatabaseConnection` — reused nearly
//! verbatim, since pool lifecycle is domain-agnostic.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::Result;

pub type DatabasePool = SqlitePool;

#[derive(Debug, Clone)]
pub struct PoolStatistics {
    pub idle_connections: u32,
    pub active_connections: u32,
    pub max_connections: u32,
    pub collected_at: u64,
}

/// Owns the connection pool; every `TaskStore` call borrows it.
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Arc<DatabasePool>,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Apply every `*.sql` migration in `migrations_path` idempotently.
    pub async fn run_migrations(&self, migrations_path: &str) -> Result<()> {
        let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(migrations_path)).await?;
        migrator.run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }

    pub fn get_pool_statistics(&self) -> PoolStatistics {
        let collected_at = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let idle = self.pool.num_idle() as u32;
        let total = self.pool.size();
        PoolStatistics { idle_connections: idle, active_connections: total.saturating_sub(idle), max_connections: total, collected_at }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_to_in_memory_database() {
        let conn = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        assert!(conn.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn reports_pool_statistics() {
        let conn = DatabaseConnection::with_max_connections("sqlite::memory:", 3).await.unwrap();
        let stats = conn.get_pool_statistics();
        assert!(stats.collected_at > 0);
    }
}
