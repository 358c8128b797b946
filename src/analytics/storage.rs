//! Analytics storage interface

use anyhow::Result;
use async_trait::async_trait;

use super::models::{AnalyticsRecord, AnalyticsSummary, ClickEvent};
use crate::models::ClickInfo;
use crate::storage::StorageResult;

/// Per-short-link click history.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Create the schema if it does not exist yet
    async fn init(&self) -> Result<()>;

    /// Append a click, creating the record on the first click and bumping
    /// its `updated_at`. Concurrent calls for the same short link never
    /// lose a click.
    async fn record_click(&self, short_link: &str, click: &ClickInfo) -> StorageResult<ClickEvent>;

    async fn get(&self, short_link: &str) -> StorageResult<Option<AnalyticsRecord>>;

    async fn summary(&self, short_link: &str) -> StorageResult<Option<AnalyticsSummary>>;

    async fn ping(&self) -> StorageResult<()>;
}
