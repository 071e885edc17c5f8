use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{RateLimitDecision, RateLimitError, RateLimitStore};

/// Fixed-window counters in Redis, shared by every instance using the same server.
///
/// `INCR` and `PTTL` run in one MULTI block. The window starts when the key is first
/// created: a missing expiry (`PTTL` < 0) means this request opened the window, so the
/// key gets its `PEXPIRE` then. Rejected requests still increment the counter; only
/// the comparison against the quota matters until the key expires.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    client: redis::Client,
}

impl RedisRateLimitStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);

        let (count, ttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        let reset_after_ms = if ttl_ms < 0 {
            conn.pexpire::<_, ()>(key, window_ms).await?;
            window_ms
        } else {
            ttl_ms
        };

        let used = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(RateLimitDecision {
            allowed: used <= max_requests,
            limit: max_requests,
            remaining: max_requests.saturating_sub(used),
            reset_after: Duration::from_millis(u64::try_from(reset_after_ms).unwrap_or(0)),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
