//! Fixed-window request limiting in front of the generation routes.
//!
//! Each `RateLimiter` owns a key namespace (`ip` or `user`) and a quota. The counter
//! lives in a `RateLimitStore`: `InMemoryRateLimitStore` is process-local, so every
//! instance of a multi-instance deployment enforces its own limit;
//! `RedisRateLimitStore` shares counters across instances.
//!
//! Windows are fixed, not sliding. A client that bursts at the end of one window and
//! again at the start of the next can get close to twice the quota through.

pub mod middleware;
pub mod redis_store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RateLimitSettings;

pub use redis_store::RedisRateLimitStore;

/// Expired windows are swept once the in-memory map grows past this many keys.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Outcome of counting one request against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole seconds until the window closes, never less than 1.
    pub fn retry_after_secs(&self) -> u64 {
        let millis = u64::try_from(self.reset_after.as_millis()).unwrap_or(u64::MAX);
        millis.div_ceil(1000).max(1)
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one request for `key` and reports whether it fits the quota.
    async fn check(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> Result<RateLimitDecision, RateLimitError>;

    /// Forgets the window for `key`.
    #[allow(dead_code)]
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.reset_at > now);
        }

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + window,
        });
        if now >= entry.reset_at {
            *entry = WindowEntry {
                count: 0,
                reset_at: now + window,
            };
        }

        let allowed = entry.count < max_requests;
        if allowed {
            entry.count += 1;
        }

        Ok(RateLimitDecision {
            allowed,
            limit: max_requests,
            remaining: max_requests.saturating_sub(entry.count),
            reset_after: entry.reset_at.saturating_duration_since(now),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One quota applied to one kind of caller identity.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    scope: &'static str,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, scope: &'static str, settings: RateLimitSettings) -> Self {
        Self {
            store,
            scope,
            settings,
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.store
            .check(
                &self.key(identity),
                self.settings.window,
                self.settings.max_requests,
            )
            .await
    }

    #[allow(dead_code)]
    pub async fn reset(&self, identity: &str) -> Result<(), RateLimitError> {
        self.store.reset(&self.key(identity)).await
    }

    fn key(&self, identity: &str) -> String {
        format!("ratelimit:{}:{identity}", self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            "ip",
            RateLimitSettings {
                max_requests,
                window: Duration::from_millis(60_000),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_is_rejected() {
        let limiter = limiter(10);
        for i in 0..10 {
            let decision = limiter.check("10.0.0.1").await.unwrap();
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.remaining, 9 - i);
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        let decision = limiter.check("10.0.0.1").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_secs(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rollover_resets_counter() {
        let limiter = limiter(2);
        limiter.check("u").await.unwrap();
        limiter.check("u").await.unwrap();
        assert!(!limiter.check("u").await.unwrap().allowed);

        tokio::time::advance(Duration::from_millis(60_000)).await;
        let decision = limiter.check("u").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_after, Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check("a").await.unwrap().allowed);
        assert!(!limiter.check("a").await.unwrap().allowed);
        assert!(limiter.check("b").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_counters() {
        let store: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimitStore::new());
        let settings = RateLimitSettings {
            max_requests: 1,
            window: Duration::from_secs(60),
        };
        let ip = RateLimiter::new(store.clone(), "ip", settings);
        let user = RateLimiter::new(store, "user", settings);

        assert!(ip.check("same").await.unwrap().allowed);
        assert!(user.check("same").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_window() {
        let limiter = limiter(1);
        limiter.check("k").await.unwrap();
        assert!(!limiter.check("k").await.unwrap().allowed);
        limiter.reset("k").await.unwrap();
        assert!(limiter.check("k").await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_windows_are_swept() {
        let store = InMemoryRateLimitStore::new();
        for i in 0..SWEEP_THRESHOLD {
            store
                .check(&format!("k{i}"), Duration::from_secs(1), 5)
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;
        store.check("fresh", Duration::from_secs(60), 5).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_after: Duration::from_millis(1_001),
        };
        assert_eq!(decision.retry_after_secs(), 2);

        let closing = RateLimitDecision {
            reset_after: Duration::ZERO,
            ..decision
        };
        assert_eq!(closing.retry_after_secs(), 1);
    }
}
