//! In-process cache backend on top of Moka.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use tracing::debug;

use super::backend::{BackendFailure, CacheBackend, Lookup, Removal};

#[derive(Clone)]
struct StoredEntry {
    body: Bytes,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with. Overwrites restart
/// the clock; reads never extend it.
struct WrittenTtl;

impl Expiry<String, StoredEntry> for WrittenTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// A bounded, in-memory [`CacheBackend`] with per-entry TTL.
///
/// Clones share the same underlying store.
#[derive(Clone)]
pub struct MemoryBackend {
    cache: MokaCache<String, StoredEntry>,
}

impl MemoryBackend {
    /// Creates a backend holding at most `max_entries` entries.
    pub fn new(max_entries: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(WrittenTtl)
            .build();

        debug!(max_entries, "memory cache backend created");

        Self { cache }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Lookup, BackendFailure> {
        Ok(match self.cache.get(key).await {
            Some(entry) => Lookup::Hit(entry.body),
            None => Lookup::Miss,
        })
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendFailure> {
        if ttl.is_zero() {
            return Err(BackendFailure::new("ttl must be greater than zero"));
        }
        self.cache
            .insert(key.to_owned(), StoredEntry { body: value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Removal, BackendFailure> {
        Ok(match self.cache.remove(key).await {
            Some(_) => Removal::Deleted,
            None => Removal::NotFound,
        })
    }
}
