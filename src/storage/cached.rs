use crate::cache::TtlLruCache;
use crate::config::CacheConfig;
use crate::models::UrlRecord;
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::{LookupResult, StorageError, StorageResult, UrlStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

/// Read-through cache in front of a [`UrlStore`], with every store call
/// wrapped in the transient-failure retry loop.
pub struct UrlRepository {
    /// Underlying storage implementation
    inner: Arc<dyn UrlStore>,
    /// Resolved mappings; `None` when caching is disabled
    cache: Option<Arc<TtlLruCache<String, UrlRecord>>>,
    /// Bumped by every delete. A read-through fill only lands if no delete
    /// happened while its store read was in flight.
    invalidations: Mutex<u64>,
    retry: RetryPolicy,
    /// Stops the background sweeper
    shutdown_tx: watch::Sender<bool>,
}

impl UrlRepository {
    /// Must be called from within a tokio runtime when the sweeper is enabled.
    pub fn new(inner: Arc<dyn UrlStore>, cache_config: &CacheConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let cache = cache_config.enabled.then(|| {
            Arc::new(TtlLruCache::new(
                cache_config.max_entries,
                cache_config.ttl(),
            ))
        });

        if let Some(cache) = cache.as_ref().filter(|_| cache_config.sweep_interval_secs > 0) {
            let cache = Arc::clone(cache);
            let period = Duration::from_secs(cache_config.sweep_interval_secs);
            tokio::spawn(async move {
                let mut interval = time::interval(period);
                // The first tick completes immediately
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let purged = cache.purge_expired();
                            if purged > 0 {
                                debug!(purged, remaining = cache.len(), "swept expired cache entries");
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                info!("Cache sweeper stopped");
                                break;
                            }
                        }
                    }
                }
            });
        }

        Self {
            inner,
            cache,
            invalidations: Mutex::new(0),
            retry: RetryPolicy::url_store(),
            shutdown_tx,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Signal the background sweeper to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn get(&self, short_code: &str) -> StorageResult<Option<UrlRecord>> {
        Ok(self.lookup(short_code).await?.record)
    }

    /// Like [`UrlRepository::get`], also reporting whether the cache answered.
    pub async fn lookup(&self, short_code: &str) -> StorageResult<LookupResult> {
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(short_code) {
                debug!(short_code, "cache hit");
                return Ok(LookupResult {
                    record: Some(record),
                    cache_hit: true,
                });
            }
            debug!(short_code, "cache miss");
        }

        let generation = *self.invalidations.lock();
        let record = self.fetch_from_store(short_code).await?;

        if let (Some(cache), Some(record)) = (&self.cache, &record) {
            let invalidations = self.invalidations.lock();
            if *invalidations == generation {
                cache.insert(short_code.to_string(), record.clone());
            } else {
                debug!(short_code, "skipped cache fill raced by a delete");
            }
        }

        Ok(LookupResult {
            record,
            cache_hit: false,
        })
    }

    /// Store a new mapping. Re-creating an existing mapping with the same
    /// target returns the stored record; a different target is a
    /// [`StorageError::Conflict`] and never overwrites the existing row.
    pub async fn create(&self, short_code: &str, target_url: &str) -> StorageResult<UrlRecord> {
        let inserted = with_retry(
            "insert url",
            &self.retry,
            StorageError::is_transient,
            || self.inner.insert(short_code, target_url),
        )
        .await;

        let record = match inserted {
            Ok(record) => record,
            Err(StorageError::Conflict) => {
                // Lost a race or re-created an existing mapping
                match self.fetch_from_store(short_code).await? {
                    Some(existing) if existing.target_url == target_url => existing,
                    _ => {
                        warn!(short_code, "short code already maps to a different URL");
                        return Err(StorageError::Conflict);
                    }
                }
            }
            Err(err) => return Err(err),
        };

        if let Some(cache) = &self.cache {
            cache.insert(short_code.to_string(), record.clone());
        }

        Ok(record)
    }

    pub async fn delete(&self, short_code: &str) -> StorageResult<()> {
        let deleted = with_retry(
            "delete url",
            &self.retry,
            StorageError::is_transient,
            || self.inner.delete(short_code),
        )
        .await?;

        if let Some(cache) = &self.cache {
            let mut invalidations = self.invalidations.lock();
            *invalidations += 1;
            cache.remove(short_code);
        }

        if deleted {
            info!(short_code, "deleted short link");
        }

        Ok(())
    }

    pub async fn list(&self) -> StorageResult<Vec<UrlRecord>> {
        with_retry(
            "list urls",
            &self.retry,
            StorageError::is_transient,
            || self.inner.list(),
        )
        .await
    }

    /// Existing mapping for a target URL. Not cached.
    pub async fn find_by_url(&self, target_url: &str) -> StorageResult<Option<UrlRecord>> {
        with_retry(
            "find url by target",
            &self.retry,
            StorageError::is_transient,
            || self.inner.find_by_url(target_url),
        )
        .await
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    /// Drop expired cache entries now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.cache
            .as_ref()
            .map(|cache| cache.purge_expired())
            .unwrap_or(0)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map(|cache| cache.len()).unwrap_or(0)
    }

    async fn fetch_from_store(&self, short_code: &str) -> StorageResult<Option<UrlRecord>> {
        with_retry(
            "get url",
            &self.retry,
            StorageError::is_transient,
            || self.inner.get(short_code),
        )
        .await
    }
}

impl Drop for UrlRepository {
    fn drop(&mut self) {
        self.shutdown();
    }
}
