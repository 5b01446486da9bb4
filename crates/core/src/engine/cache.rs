//! Shared TTL cache for similarity lookups.
//!
//! Entries are immutable `Arc` snapshots. A writer builds the entry completely
//! and only then publishes it under the write lock, so readers never observe a
//! partially written value.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::engine::retrieval::SimilarityOutcome;

#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, stored_at: DateTime<Utc>) -> Self {
        Self { value: Arc::new(value), stored_at }
    }

    pub fn value(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Entries stamped in the future count as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now - self.stored_at;
        age >= Duration::zero() && age < ttl
    }
}

#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Arc<CacheEntry<V>>>>,
}

pub type SimilarityCache = TtlCache<SimilarityOutcome>;

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`; stale entries read as absent. A poisoned lock reads as a miss.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<V>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        entry.is_fresh(now, self.ttl).then(|| entry.value())
    }

    pub fn insert(&self, key: impl Into<String>, value: V, now: DateTime<Utc>) -> Arc<V> {
        let entry = Arc::new(CacheEntry::new(value, now));
        let published = entry.value();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), entry);
        }
        published
    }

    /// Drops stale entries and returns how many were removed.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
