use std::sync::Arc;
use tracing::debug;

use super::models::{AnalyticsRecord, AnalyticsSummary, ClickEvent};
use super::storage::AnalyticsStore;
use crate::models::ClickInfo;
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::{StorageError, StorageResult};

/// [`AnalyticsStore`] access with transient failures retried.
pub struct AnalyticsRepository {
    inner: Arc<dyn AnalyticsStore>,
    retry: RetryPolicy,
}

impl AnalyticsRepository {
    pub fn new(inner: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            inner,
            retry: RetryPolicy::analytics_store(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Each attempt runs in its own transaction; a failed attempt is rolled
    /// back before the next one starts.
    pub async fn record_click(&self, short_link: &str, click: &ClickInfo) -> StorageResult<ClickEvent> {
        let event = with_retry(
            "record click",
            &self.retry,
            StorageError::is_transient,
            || self.inner.record_click(short_link, click),
        )
        .await?;

        debug!(short_link, country = %event.country, "click recorded");
        Ok(event)
    }

    pub async fn get(&self, short_link: &str) -> StorageResult<Option<AnalyticsRecord>> {
        with_retry(
            "get analytics",
            &self.retry,
            StorageError::is_transient,
            || self.inner.get(short_link),
        )
        .await
    }

    pub async fn summary(&self, short_link: &str) -> StorageResult<Option<AnalyticsSummary>> {
        with_retry(
            "summarize analytics",
            &self.retry,
            StorageError::is_transient,
            || self.inner.summary(short_link),
        )
        .await
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }
}
