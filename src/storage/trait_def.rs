use crate::models::UrlRecord;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error("transient database error: {0}")]
    Transient(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StorageError::Conflict;
            }
        }

        if is_transient_sqlx_error(&err) {
            StorageError::Transient(err)
        } else {
            StorageError::Database(err)
        }
    }
}

/// Connection-level failures and lock/serialization conflicts are transient;
/// constraint violations and malformed queries are not.
pub fn is_transient_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => {
                let code = code.as_ref();
                // SQLite BUSY / LOCKED (including extended result codes)
                matches!(code, "5" | "6" | "261" | "262" | "517")
                    // PostgreSQL connection exceptions
                    || code.starts_with("08")
                    // serialization failure, deadlock, shutdown in progress
                    || matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03")
            }
            None => db_err.message().to_lowercase().contains("database is locked"),
        },
        _ => false,
    }
}

/// Persistent store of short code to URL mappings.
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Create the schema if it does not exist yet
    async fn init(&self) -> Result<()>;

    /// Insert a new mapping; fails with [`StorageError::Conflict`] when the
    /// short code is already taken.
    async fn insert(&self, short_code: &str, target_url: &str) -> StorageResult<UrlRecord>;

    async fn get(&self, short_code: &str) -> StorageResult<Option<UrlRecord>>;

    /// Oldest mapping pointing at `target_url`, if any
    async fn find_by_url(&self, target_url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Delete a mapping, returning whether a row was removed
    async fn delete(&self, short_code: &str) -> StorageResult<bool>;

    /// All mappings, newest first
    async fn list(&self) -> StorageResult<Vec<UrlRecord>>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> StorageResult<()>;
}
