use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_TEXT_API_URL: &str = "https://text.pollinations.ai/openai";
const DEFAULT_TEXT_MODEL: &str = "openai";
const DEFAULT_IMAGE_BASE_URL: &str = "https://image.pollinations.ai/prompt/";

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// When unset, the result cache and rate-limit counters live in process memory.
    pub redis_url: Option<String>,
    pub text_api_url: String,
    pub text_api_key: Option<String>,
    pub text_model: String,
    pub image_base_url: String,
    pub request_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown: Duration,
    pub ip_rate_limit: RateLimitSettings,
    pub user_rate_limit: RateLimitSettings,
}

/// Fixed-window quota for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            redis_url: optional("REDIS_URL"),
            text_api_url: optional("AI_TEXT_API_URL")
                .unwrap_or_else(|| DEFAULT_TEXT_API_URL.to_string()),
            text_api_key: optional("AI_TEXT_API_KEY"),
            text_model: optional("AI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_base_url: optional("AI_IMAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_IMAGE_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(parse_or(&lookup, "AI_REQUEST_TIMEOUT_SECS", 30)?),
            retry_max_attempts: parse_or(&lookup, "AI_RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_or(
                &lookup,
                "AI_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            circuit_failure_threshold: parse_or(&lookup, "AI_CIRCUIT_FAILURE_THRESHOLD", 5)?,
            circuit_cooldown: Duration::from_secs(parse_or(
                &lookup,
                "AI_CIRCUIT_COOLDOWN_SECS",
                60,
            )?),
            ip_rate_limit: RateLimitSettings {
                max_requests: parse_or(&lookup, "AI_IP_RATE_LIMIT_MAX", 30)?,
                window: Duration::from_millis(parse_or(
                    &lookup,
                    "AI_IP_RATE_LIMIT_WINDOW_MS",
                    60_000,
                )?),
            },
            user_rate_limit: RateLimitSettings {
                max_requests: parse_or(&lookup, "AI_USER_RATE_LIMIT_MAX", 10)?,
                window: Duration::from_millis(parse_or(
                    &lookup,
                    "AI_USER_RATE_LIMIT_WINDOW_MS",
                    60_000,
                )?),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}
