use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::kv::KvStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// SQLite-backed `KvStore`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and ensures the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Initializing key-value store at: {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        debug!("Key-value schema ready");
        Ok(())
    }

    /// Deletes rows whose TTL has elapsed; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!("Purged {} expired key-value entries", removed);
        }
        Ok(removed)
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Key-value store closed");
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        sqlx::query("INSERT OR REPLACE INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        // Rate-limit buckets are never read again once their window closes.
        self.purge_expired().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rate_limiter::{RateLimiter, RateLimiterConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn row_count(store: &SqliteStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("chatrelay.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.put("k", "7", Duration::from_secs(600)).await.unwrap();
        store.close().await;

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("7".to_string()));
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_and_missing() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.get("absent").await.unwrap(), None);

        store.put("k", "1", Duration::from_secs(60)).await.unwrap();
        store.put("k", "2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden_and_purged() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put("fresh", "1", Duration::from_secs(60)).await.unwrap();
        store.put("stale", "1", Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("stale").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.get("fresh").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_writes_drop_expired_rows() {
        let store = SqliteStore::in_memory().await.unwrap();
        for i in 0..50 {
            store.put(&format!("stale-{}", i), "1", Duration::ZERO).await.unwrap();
        }
        store.put("fresh", "1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_closed_rate_limit_windows_do_not_accumulate() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let config = RateLimiterConfig {
            ttl: Duration::ZERO,
            ..RateLimiterConfig::default()
        };
        let limiter = RateLimiter::new(store.clone(), config);

        for window in 0..50u64 {
            limiter.check_at(Some("alice"), window * 600).await;
        }

        assert_eq!(row_count(&store).await, 0);
    }
}
