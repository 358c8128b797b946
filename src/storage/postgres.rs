use crate::models::UrlRecord;
use crate::storage::{StorageError, StorageResult, UrlStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub async fn connect_postgres_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect_postgres_pool(database_url, max_connections).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl UrlStore for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id BIGSERIAL PRIMARY KEY,
                short_code VARCHAR(8) NOT NULL UNIQUE,
                target_url TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
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
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, UrlRecord>(
            r#"
            INSERT INTO urls (short_code, target_url, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (short_code) DO NOTHING
            RETURNING short_code, target_url, created_at
            "#,
        )
        .bind(short_code)
        .bind(target_url)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            return Err(StorageError::Conflict);
        };

        tx.commit().await?;

        Ok(record)
    }

    async fn get(&self, short_code: &str) -> StorageResult<Option<UrlRecord>> {
        let record = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT short_code, target_url, created_at
            FROM urls
            WHERE short_code = $1
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
            WHERE target_url = $1
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
        let result = sqlx::query("DELETE FROM urls WHERE short_code = $1")
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
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
