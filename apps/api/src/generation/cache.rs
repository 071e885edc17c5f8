//! Result cache: TTL key/value storage for generated text and image URLs.
//!
//! Two slots per generation:
//! - primary: `key`, written with a TTL, expires normally
//! - fallback: `key:fallback`, written without a TTL, overwritten only on a new success
//!   and read only when the live path is exhausted
//!
//! `CacheStore` is the pluggable backend (`InMemoryCacheStore` by default,
//! `RedisCacheStore` when `REDIS_URL` is set). `ResultCache` layers the slot
//! semantics on top.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

use crate::generation::request::CacheKey;

/// Expired entries are swept once the in-memory map grows past this many keys.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(test)]
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// A key/value store with optional per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes `value`. `ttl: None` stores it without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-process store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Process-local cache. Correct for a single instance; each process has its own copy.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        // Opportunistic GC: sweep expired entries when the map grows large
        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, stored| stored.is_live(now));
        }

        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis store
// ────────────────────────────────────────────────────────────────────────────

/// Redis-backed cache shared by every instance pointing at the same server.
#[derive(Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
}

impl RedisCacheStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        match ttl {
            Some(ttl) => {
                // SET EX rejects 0; round sub-second TTLs up
                let seconds = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, seconds).await?;
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slot semantics
// ────────────────────────────────────────────────────────────────────────────

/// Primary + fallback slot access over any `CacheStore`.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// Reads the primary slot. Backend errors propagate; the text path treats them as a miss.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        self.store.get(key.as_str()).await
    }

    /// Writes only the primary slot.
    pub async fn put(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.store.set(key.as_str(), value, Some(ttl)).await
    }

    /// Writes the primary slot with `ttl` and the fallback slot without expiry.
    /// Both writes are attempted even if the first fails.
    pub async fn put_with_fallback(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let primary = self.store.set(key.as_str(), value, Some(ttl)).await;
        let fallback = self.store.set(&key.fallback(), value, None).await;
        primary.and(fallback)
    }

    /// Reads the fallback slot. Errors are logged and reported as absent.
    pub async fn get_fallback(&self, key: &CacheKey) -> Option<String> {
        match self.store.get(&key.fallback()).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Fallback cache read failed for {key}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_raw(format!("ai:text:{name}"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_slot_expires_after_ttl() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_slot_outlives_primary() {
        let cache = ResultCache::in_memory();
        let k = key("summary");
        cache
            .put_with_fallback(&k, "generated", Duration::from_secs(3600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(7 * 24 * 3600)).await;

        assert_eq!(cache.get(&k).await.unwrap(), None);
        assert_eq!(cache.get_fallback(&k).await.as_deref(), Some("generated"));
    }

    #[tokio::test]
    async fn test_put_does_not_touch_fallback() {
        let cache = ResultCache::in_memory();
        let k = key("image");
        cache.put(&k, "url", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("url"));
        assert_eq!(cache.get_fallback(&k).await, None);
    }

    #[tokio::test]
    async fn test_new_success_overwrites_fallback() {
        let cache = ResultCache::in_memory();
        let k = key("letter");
        cache
            .put_with_fallback(&k, "first", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put_with_fallback(&k, "second", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_fallback(&k).await.as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_map_sweeps_expired_entries() {
        let store = InMemoryCacheStore::new();
        for i in 0..SWEEP_THRESHOLD {
            store
                .set(&format!("old-{i}"), "v", Some(Duration::from_secs(1)))
                .await
                .unwrap();
        }
        store.set("durable", "v", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set("fresh", "v", Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(store.len().await, 2);
    }
}
