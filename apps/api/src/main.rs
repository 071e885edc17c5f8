mod config;
mod errors;
mod generation;
mod llm_client;
mod models;
mod rate_limit;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::generation::cache::{CacheStore, InMemoryCacheStore, RedisCacheStore};
use crate::llm_client::LlmClient;
use crate::rate_limit::{InMemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hire API v{}", env!("CARGO_PKG_VERSION"));

    // Cache and rate-limit counters: Redis when configured, process memory otherwise
    let (cache_store, limit_store): (Arc<dyn CacheStore>, Arc<dyn RateLimitStore>) =
        match &config.redis_url {
            Some(url) => {
                let redis = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
                info!("Redis client initialized");
                (
                    Arc::new(RedisCacheStore::new(redis.clone())),
                    Arc::new(RedisRateLimitStore::new(redis)),
                )
            }
            None => {
                info!("REDIS_URL not set; cache and rate limits are local to this process");
                (
                    Arc::new(InMemoryCacheStore::new()),
                    Arc::new(InMemoryRateLimitStore::new()),
                )
            }
        };

    // Initialize text provider client
    let llm = LlmClient::new(
        config.text_api_url.clone(),
        config.text_api_key.clone(),
        config.request_timeout,
    )?;
    info!(
        "LLM client initialized (endpoint: {}, model: {})",
        config.text_api_url, config.text_model
    );

    // Build app state
    let state = AppState::new(&config, Arc::new(llm), cache_store, limit_store);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
