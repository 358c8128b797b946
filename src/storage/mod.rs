pub mod cached;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;


pub use cached::UrlRepository;
pub use postgres::{connect_postgres_pool, PostgresStorage};
pub use sqlite::{connect_sqlite_pool, SqliteStorage};
pub use trait_def::{is_transient_sqlx_error, StorageError, StorageResult, UrlStore};

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::models::UrlRecord;
use std::sync::Arc;

/// Outcome of a repository read
#[derive(Debug, Clone)]
pub struct LookupResult {
    pub record: Option<UrlRecord>,
    pub cache_hit: bool,
}

/// Open and initialise the URL store selected by configuration.
pub async fn open_url_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn UrlStore>> {
    let store: Arc<dyn UrlStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };
    store.init().await?;
    Ok(store)
}
