//! Click analytics: per-short-link click history and its HTTP API
//!
//! Clicks arrive over gRPC (see [`crate::rpc::server`]) and are appended to
//! one record per short link, created on the first click.

pub mod api;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod sqlite;
pub mod storage;

pub use api::create_analytics_router;
pub use models::{AnalyticsRecord, AnalyticsSummary, ClickEvent, CountEntry};
pub use postgres::PostgresAnalyticsStorage;
pub use repository::AnalyticsRepository;
pub use sqlite::SqliteAnalyticsStorage;
pub use storage::AnalyticsStore;

use crate::config::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;

/// Open and initialise the analytics store selected by configuration.
pub async fn open_analytics_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn AnalyticsStore>> {
    let store: Arc<dyn AnalyticsStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteAnalyticsStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresAnalyticsStorage::new(&config.url, config.max_connections).await?)
        }
    };
    store.init().await?;
    Ok(store)
}
