//! Image URL builder: deterministic image-provider URLs.
//!
//! The image provider is addressed purely by URL; this module never calls it. The URL is
//! cached for 24h like text results, but there is no circuit breaker: any failure building
//! or caching the URL yields `PLACEHOLDER_IMAGE_URL` instead of an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::generation::cache::{CacheError, ResultCache};
use crate::generation::request::CacheKey;

pub const PLACEHOLDER_IMAGE_URL: &str = "/images/job-banner-placeholder.png";
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image prompt is empty")]
    EmptyPrompt,

    #[error("Invalid image URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Image cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub no_logo: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 630,
            seed: 42,
            no_logo: true,
        }
    }
}

/// Builds `{base}{encoded prompt}?width=..&height=..&seed=..&nologo=..`.
pub fn build_image_url(base_url: &str, prompt: &str, options: &ImageOptions) -> Result<String, ImageError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ImageError::EmptyPrompt);
    }

    let url = format!(
        "{base_url}{}?width={}&height={}&seed={}&nologo={}",
        urlencoding::encode(prompt),
        options.width,
        options.height,
        options.seed,
        options.no_logo
    );
    // Reject anything that is not an absolute URL (e.g. a misconfigured base)
    Url::parse(&url)?;
    Ok(url)
}

/// Keyed on the provider base too, so a shared cache never serves URLs for a previous host.
fn image_cache_key(base_url: &str, prompt: &str, options: &ImageOptions) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(base_url.as_bytes());
    hasher.update([0]);
    hasher.update(prompt.trim().as_bytes());
    hasher.update(options.width.to_be_bytes());
    hasher.update(options.height.to_be_bytes());
    hasher.update(options.seed.to_be_bytes());
    hasher.update([u8::from(options.no_logo)]);
    CacheKey::from_raw(format!("ai:image:{}", hex::encode(hasher.finalize())))
}

#[derive(Clone)]
pub struct ImageGenerator {
    base_url: String,
    cache: ResultCache,
}

impl ImageGenerator {
    pub fn new(base_url: impl Into<String>, cache: ResultCache) -> Self {
        Self {
            base_url: base_url.into(),
            cache,
        }
    }

    /// Returns the image URL for `prompt`, or the placeholder on any failure.
    pub async fn generate_image(&self, prompt: &str, options: &ImageOptions) -> String {
        match self.try_generate(prompt, options).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Image generation degraded to placeholder: {e}");
                PLACEHOLDER_IMAGE_URL.to_string()
            }
        }
    }

    async fn try_generate(&self, prompt: &str, options: &ImageOptions) -> Result<String, ImageError> {
        let key = image_cache_key(&self.base_url, prompt, options);
        if let Some(url) = self.cache.get(&key).await? {
            debug!("Image cache hit for {key}");
            return Ok(url);
        }

        let url = build_image_url(&self.base_url, prompt, options)?;
        self.cache.put(&key, &url, IMAGE_CACHE_TTL).await?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::cache::CacheStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    const BASE: &str = "https://image.pollinations.ai/prompt/";

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Backend("disk full".to_string()))
        }
    }

    #[test]
    fn test_url_encodes_prompt_and_appends_defaults() {
        let url = build_image_url(BASE, "Modern office, team at work", &ImageOptions::default()).unwrap();
        assert_eq!(
            url,
            "https://image.pollinations.ai/prompt/Modern%20office%2C%20team%20at%20work\
             ?width=1200&height=630&seed=42&nologo=true"
        );
    }

    #[test]
    fn test_same_inputs_same_url() {
        let options = ImageOptions {
            width: 800,
            height: 800,
            seed: 7,
            no_logo: false,
        };
        let a = build_image_url(BASE, "logo / mark?", &options).unwrap();
        let b = build_image_url(BASE, "logo / mark?", &options).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("logo%20%2F%20mark%3F"));
        assert!(a.ends_with("?width=800&height=800&seed=7&nologo=false"));
    }

    #[test]
    fn test_invalid_base_is_an_error() {
        assert!(build_image_url("not a url/", "office", &ImageOptions::default()).is_err());
        assert!(matches!(
            build_image_url(BASE, "   ", &ImageOptions::default()),
            Err(ImageError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ImageOptions = serde_json::from_str(r#"{"width": 512}"#).unwrap();
        assert_eq!(options.width, 512);
        assert_eq!(options.height, 630);
        assert_eq!(options.seed, 42);
        assert!(options.no_logo);
    }

    #[tokio::test]
    async fn test_generate_image_caches_url() {
        let cache = ResultCache::in_memory();
        let generator = ImageGenerator::new(BASE, cache.clone());
        let options = ImageOptions::default();

        let url = generator.generate_image("city skyline", &options).await;
        assert!(url.starts_with(BASE));
        let key = image_cache_key(BASE, "city skyline", &options);
        assert_eq!(cache.get(&key).await.unwrap(), Some(url));
    }

    #[tokio::test]
    async fn test_changed_base_url_is_not_served_from_cache() {
        let cache = ResultCache::in_memory();
        let options = ImageOptions::default();
        let old_host = ImageGenerator::new(BASE, cache.clone());
        let new_host = ImageGenerator::new("https://images.example.com/p/", cache);

        let first = old_host.generate_image("city skyline", &options).await;
        let second = new_host.generate_image("city skyline", &options).await;
        assert!(first.starts_with(BASE));
        assert!(second.starts_with("https://images.example.com/p/"));
        assert_ne!(
            image_cache_key(BASE, "city skyline", &options),
            image_cache_key("https://images.example.com/p/", "city skyline", &options)
        );
    }

    #[tokio::test]
    async fn test_bad_base_url_returns_placeholder() {
        let generator = ImageGenerator::new("::broken::", ResultCache::in_memory());
        let url = generator.generate_image("city skyline", &ImageOptions::default()).await;
        assert_eq!(url, PLACEHOLDER_IMAGE_URL);
    }

    #[tokio::test]
    async fn test_cache_write_failure_returns_placeholder() {
        let generator = ImageGenerator::new(BASE, ResultCache::new(Arc::new(BrokenStore)));
        let url = generator.generate_image("city skyline", &ImageOptions::default()).await;
        assert_eq!(url, PLACEHOLDER_IMAGE_URL);
    }
}
