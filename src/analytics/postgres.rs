use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

use super::models::{AnalyticsRecord, AnalyticsRow, AnalyticsSummary, ClickEvent, CountEntry};
use super::storage::AnalyticsStore;
use crate::models::ClickInfo;
use crate::storage::{connect_postgres_pool, StorageResult};

pub struct PostgresAnalyticsStorage {
    pool: Arc<PgPool>,
}

impl PostgresAnalyticsStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect_postgres_pool(database_url, max_connections).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn find_row(&self, short_link: &str) -> StorageResult<Option<AnalyticsRow>> {
        let row = sqlx::query_as::<_, AnalyticsRow>(
            "SELECT id, short_link, updated_at FROM analytics WHERE short_link = $1",
        )
        .bind(short_link)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn count_by(&self, analytics_id: i64, column: &'static str) -> StorageResult<Vec<CountEntry>> {
        let query = format!(
            "SELECT {column} AS value, COUNT(*) AS count FROM clicks \
             WHERE analytics_id = $1 GROUP BY {column} ORDER BY count DESC, value ASC"
        );

        let entries = sqlx::query_as::<_, CountEntry>(&query)
            .bind(analytics_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(entries)
    }
}

#[async_trait]
impl AnalyticsStore for PostgresAnalyticsStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics (
                id BIGSERIAL PRIMARY KEY,
                short_link VARCHAR(64) NOT NULL UNIQUE,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id BIGSERIAL PRIMARY KEY,
                analytics_id BIGINT NOT NULL REFERENCES analytics(id) ON DELETE CASCADE,
                ip TEXT NOT NULL,
                city TEXT NOT NULL,
                country TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_analytics_id ON clicks(analytics_id)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn record_click(&self, short_link: &str, click: &ClickInfo) -> StorageResult<ClickEvent> {
        let now = Utc::now();
        // The upsert holds the row lock until commit, serializing appends per record
        let mut tx = self.pool.begin().await?;

        let analytics_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO analytics (short_link, updated_at)
            VALUES ($1, $2)
            ON CONFLICT (short_link) DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(short_link)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO clicks (analytics_id, ip, city, country, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(analytics_id)
        .bind(&click.ip)
        .bind(&click.city)
        .bind(&click.country)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ClickEvent {
            ip: click.ip.clone(),
            city: click.city.clone(),
            country: click.country.clone(),
            created_at: now,
        })
    }

    async fn get(&self, short_link: &str) -> StorageResult<Option<AnalyticsRecord>> {
        let Some(row) = self.find_row(short_link).await? else {
            return Ok(None);
        };

        let clicks = sqlx::query_as::<_, ClickEvent>(
            r#"
            SELECT ip, city, country, created_at
            FROM clicks
            WHERE analytics_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(Some(AnalyticsRecord {
            short_link: row.short_link,
            clicks,
            updated_at: row.updated_at,
        }))
    }

    async fn summary(&self, short_link: &str) -> StorageResult<Option<AnalyticsSummary>> {
        let Some(row) = self.find_row(short_link).await? else {
            return Ok(None);
        };

        let total_clicks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM clicks WHERE analytics_id = $1")
                .bind(row.id)
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(Some(AnalyticsSummary {
            total_clicks,
            by_country: self.count_by(row.id, "country").await?,
            by_city: self.count_by(row.id, "city").await?,
            short_link: row.short_link,
            updated_at: row.updated_at,
        }))
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
