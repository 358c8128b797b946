//! Bounded in-process cache with least-recently-used eviction and
//! time-based expiry.
//!
//! Recency bookkeeping is delegated to [`lru::LruCache`]. Expired entries are
//! dropped lazily when they are read, and in bulk by
//! [`TtlLruCache::purge_expired`], which the shortener runs from a
//! background sweeper. All state sits behind one mutex that is never held
//! across an await point.

use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

pub struct TtlLruCache<K, V> {
    /// `None` when configured with zero capacity
    entries: Option<Mutex<LruCache<K, (V, Instant)>>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: NonZeroUsize::new(max_entries).map(|cap| Mutex::new(LruCache::new(cap))),
            max_entries,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns a clone of the live value and marks it most recently used.
    /// Reads never extend an entry's lifetime.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.as_ref()?.lock();
        let (value, inserted_at) = entries.get(key)?;
        if inserted_at.elapsed() < self.ttl {
            return Some(value.clone());
        }
        entries.pop(key);
        None
    }

    /// Inserts or replaces a value, resetting its expiry. The least recently
    /// used entry is evicted once the cache is full.
    pub fn insert(&self, key: K, value: V) {
        if let Some(entries) = &self.entries {
            entries.lock().put(key, (value, Instant::now()));
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.as_ref()?.lock();
        entries.pop(key).map(|(value, _)| value)
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Some(entries) = &self.entries else {
            return 0;
        };
        let mut entries = entries.lock();

        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, (_, inserted_at))| inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
