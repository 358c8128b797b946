use crate::models::UrlRecord;
use crate::storage::{StorageError, StorageResult, UrlStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

/// Open a SQLite pool. In-memory databases live as long as their single
/// connection, so those pools pin exactly one connection forever.
pub async fn connect_sqlite_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    Ok(pool_options.connect_with(options).await?)
}

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect_sqlite_pool(database_url, max_connections).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl UrlStore for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL UNIQUE,
                target_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_urls_target_url ON urls(target_url)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert(&self, short_code: &str, target_url: &str) -> StorageResult<UrlRecord> {
        // Dropping the transaction on any error path rolls it back
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO urls (short_code, target_url, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            "#,
        )
        .bind(short_code)
        .bind(target_url)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let record = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT short_code, target_url, created_at
            FROM urls
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record)
    }

    async fn get(&self, short_code: &str) -> StorageResult<Option<UrlRecord>> {
        let record = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT short_code, target_url, created_at
            FROM urls
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn find_by_url(&self, target_url: &str) -> StorageResult<Option<UrlRecord>> {
        let record = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT short_code, target_url, created_at
            FROM urls
            WHERE target_url = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(target_url)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn delete(&self, short_code: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM urls WHERE short_code = ?")
            .bind(short_code)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StorageResult<Vec<UrlRecord>> {
        let records = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT short_code, target_url, created_at
            FROM urls
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(records)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
