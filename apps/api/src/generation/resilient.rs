//! Resilient Caller: the single "generate text" entry point used by every task.
//!
//! Flow: primary cache → circuit breaker → provider with retry/backoff → cache write
//!       → (on failure) fallback slot → `GenerationUnavailable`.
//!
//! A primary cache hit short-circuits everything: no breaker check, no provider call.
//! Two concurrent misses on the same key both call the provider; the second write
//! overwrites the first with an equivalent value. No per-key coalescing.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::generation::cache::ResultCache;
use crate::generation::circuit_breaker::CircuitBreaker;
use crate::generation::request::{CacheKey, GenerationRequest};
use crate::generation::retry::RetryConfig;
use crate::llm_client::{LlmError, TextProvider};

const DEFAULT_UNAVAILABLE_MESSAGE: &str =
    "AI generation is temporarily unavailable. Please try again later or continue manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The circuit was open; the provider was not called.
    CircuitOpen,
    /// Every attempt in the retry budget failed.
    RetriesExhausted,
    /// The caller cancelled before a result was produced.
    Cancelled,
}

/// Terminal failure of the resilient path.
///
/// `fallback` carries a previously generated result for the same request when one
/// exists. Callers may present it as a stale-but-usable result with a warning.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenerationUnavailable {
    pub message: String,
    pub fallback: Option<String>,
    pub reason: UnavailableReason,
}

pub struct ResilientCaller {
    provider: Arc<dyn TextProvider>,
    cache: ResultCache,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl ResilientCaller {
    pub fn new(
        provider: Arc<dyn TextProvider>,
        cache: ResultCache,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            breaker,
            retry,
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationUnavailable> {
        self.generate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like `generate`, but stops before the next attempt once `cancel` fires.
    /// An in-flight provider call is never interrupted.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationUnavailable> {
        let key = request.cache_key();

        // Step 1: primary cache
        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                debug!(task = %request.task, "Cache hit for {key}");
                return Ok(cached);
            }
            Ok(None) => debug!(task = %request.task, "Cache miss for {key}"),
            Err(e) => warn!(task = %request.task, "Cache read failed, treating as miss: {e}"),
        }

        // Step 2: fail fast while the circuit is open. The permit lives until this call
        // returns, so a cancelled or dropped trial hands its slot back.
        let Some(permit) = self.breaker.try_acquire() else {
            warn!(task = %request.task, "Circuit open, skipping provider call");
            return Err(self
                .unavailable(request, &key, UnavailableReason::CircuitOpen)
                .await);
        };
        if permit.is_trial() {
            info!(task = %request.task, "Circuit half-open, sending trial call");
        }

        // Step 3: provider with retry
        let mut last_error: Option<LlmError> = None;
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_after(attempt - 1);
                warn!(
                    task = %request.task,
                    "Generation attempt {}/{} failed ({}), retrying after {}ms...",
                    attempt - 1,
                    self.retry.max_attempts,
                    last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    delay.as_millis()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }

            if cancel.is_cancelled() {
                info!(task = %request.task, "Generation cancelled before attempt {attempt}");
                return Err(GenerationUnavailable {
                    message: "Generation was cancelled".to_string(),
                    fallback: None,
                    reason: UnavailableReason::Cancelled,
                });
            }

            match self.call_provider(request).await {
                Ok(text) => {
                    self.breaker.record_success();
                    if let Err(e) = self
                        .cache
                        .put_with_fallback(&key, &text, request.cache_ttl)
                        .await
                    {
                        warn!(task = %request.task, "Cache write failed for {key}: {e}");
                    }
                    info!(task = %request.task, "Generation succeeded on attempt {attempt}");
                    return Ok(text);
                }
                Err(e) => last_error = Some(e),
            }
        }

        // Step 4: budget exhausted
        warn!(
            task = %request.task,
            "Generation failed after {} attempts: {}",
            self.retry.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        self.breaker.record_failure();

        // Step 5: fallback slot or nothing
        Err(self
            .unavailable(request, &key, UnavailableReason::RetriesExhausted)
            .await)
    }

    async fn call_provider(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        match tokio::time::timeout(self.call_timeout, self.provider.complete(request.completion()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.call_timeout)),
        }
    }

    async fn unavailable(
        &self,
        request: &GenerationRequest,
        key: &CacheKey,
        reason: UnavailableReason,
    ) -> GenerationUnavailable {
        let fallback = self.cache.get_fallback(key).await;
        if fallback.is_some() {
            warn!(task = %request.task, "Serving previously generated result for {key}");
        }
        GenerationUnavailable {
            message: request
                .fallback_message
                .clone()
                .unwrap_or_else(|| DEFAULT_UNAVAILABLE_MESSAGE.to_string()),
            fallback,
            reason,
        }
    }
}
