use std::sync::Arc;

use crate::config::Config;
use crate::generation::cache::{CacheStore, ResultCache};
use crate::generation::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::generation::image::ImageGenerator;
use crate::generation::prompt_builder::PromptBuilder;
use crate::generation::resilient::ResilientCaller;
use crate::generation::retry::RetryConfig;
use crate::generation::service::GenerationService;
use crate::llm_client::TextProvider;
use crate::rate_limit::middleware::RequestLimiters;
use crate::rate_limit::{RateLimitStore, RateLimiter};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the process-wide circuit breaker; every request shares it.
    pub generation: Arc<GenerationService>,
    pub limiters: RequestLimiters,
}

impl AppState {
    /// Wires the generation pipeline and limiters from config and the chosen backends.
    pub fn new(
        config: &Config,
        provider: Arc<dyn TextProvider>,
        cache_store: Arc<dyn CacheStore>,
        limit_store: Arc<dyn RateLimitStore>,
    ) -> Self {
        let cache = ResultCache::new(cache_store);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            cooldown: config.circuit_cooldown,
        }));
        let caller = ResilientCaller::new(
            provider,
            cache.clone(),
            breaker,
            RetryConfig::new(config.retry_max_attempts, config.retry_base_delay),
            config.request_timeout,
        );
        let generation = GenerationService::new(
            PromptBuilder::new(config.text_model.clone()),
            caller,
            ImageGenerator::new(config.image_base_url.clone(), cache),
        );

        Self {
            generation: Arc::new(generation),
            limiters: RequestLimiters {
                ip: RateLimiter::new(limit_store.clone(), "ip", config.ip_rate_limit),
                user: RateLimiter::new(limit_store, "user", config.user_rate_limit),
            },
        }
    }
}
