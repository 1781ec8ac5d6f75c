//! The cache itself.

use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sync_core::Result;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::key::{CacheKey, QueryKind};

#[derive(Debug, Clone)]
struct Entry {
    payload: Arc<Vec<u8>>,
    ttl: Duration,
}

/// Expire each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Read-through cache. Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<String, Entry>,
    config: CacheConfig,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The configured TTL for a kind.
    pub fn ttl_for(&self, kind: QueryKind) -> Duration {
        self.config.ttl(kind)
    }

    /// Return the cached value, or run `compute`, store the result for
    /// `ttl` and return it. Failures of `compute` are not cached.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = key.to_string();
        if let Some(entry) = self.inner.get(&key).await {
            match serde_json::from_slice::<T>(&entry.payload) {
                Ok(value) => {
                    metrics().cache_hits.inc();
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.inner.invalidate(&key).await;
                }
            }
        }

        metrics().cache_misses.inc();
        let value = compute().await?;
        let payload = serde_json::to_vec(&value)?;
        self.inner
            .insert(
                key.clone(),
                Entry {
                    payload: Arc::new(payload),
                    ttl,
                },
            )
            .await;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache fill");
        Ok(value)
    }

    /// `get_or_compute` with the kind's configured TTL.
    pub async fn get_or_compute_kind<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute(key, self.ttl_for(key.kind), compute).await
    }

    /// Whether a live, unexpired entry exists. Does not count as a read.
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.inner.contains_key(&key.to_string())
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(&key.to_string()).await;
        debug!(key = %key, "Cache key invalidated");
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let matching: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();
        for key in &matching {
            self.inner.invalidate(key.as_str()).await;
        }
        debug!(prefix = %prefix, removed = matching.len(), "Cache prefix invalidated");
        matching.len()
    }

    /// Claim a cooldown slot. Returns true if none was active, in which
    /// case the slot is held for `ttl`; false while an earlier claim lives.
    pub async fn try_claim_cooldown(&self, key: &CacheKey, ttl: Duration) -> bool {
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(async move {
                Entry {
                    payload: Arc::new(Vec::new()),
                    ttl,
                }
            })
            .await;
        entry.is_fresh()
    }

    /// Entries currently held, including ones pending eviction.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
