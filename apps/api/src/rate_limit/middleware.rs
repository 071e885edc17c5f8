//! Axum middleware applying the IP and user limiters to every generation route.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{RateLimitDecision, RateLimiter};
use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// The two limiters run per request: by client address, then by user id.
#[derive(Clone)]
pub struct RequestLimiters {
    pub ip: RateLimiter,
    pub user: RateLimiter,
}

pub async fn enforce_rate_limits(
    State(limiters): State<RequestLimiters>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = client_ip(&request);
    let user_id = user_id(request.headers());

    // The address limiter short-circuits before the user limiter is consulted
    let mut tightest = None;
    let identities = std::iter::once((&limiters.ip, client_ip))
        .chain(user_id.map(|id| (&limiters.user, id.to_string())));

    for (limiter, identity) in identities {
        let Some(decision) = check(limiter, &identity).await else {
            continue;
        };
        if !decision.allowed {
            info!(
                scope = limiter.scope(),
                "Rate limit exceeded for {identity}, retry after {}s",
                decision.retry_after_secs()
            );
            let mut response = AppError::RateLimitExceeded {
                retry_after_secs: decision.retry_after_secs(),
            }
            .into_response();
            apply_headers(response.headers_mut(), &decision);
            return response;
        }
        tightest = match tightest {
            Some(current) if tighter(&current, &decision) => Some(current),
            _ => Some(decision),
        };
    }

    let mut response = next.run(request).await;
    if let Some(decision) = tightest {
        apply_headers(response.headers_mut(), &decision);
    }
    response
}

/// Store failures fail open: the request is let through unmetered.
async fn check(limiter: &RateLimiter, identity: &str) -> Option<RateLimitDecision> {
    match limiter.check(identity).await {
        Ok(decision) => Some(decision),
        Err(e) => {
            warn!(scope = limiter.scope(), "Rate limit store failed, allowing request: {e}");
            None
        }
    }
}

fn tighter(a: &RateLimitDecision, b: &RateLimitDecision) -> bool {
    a.remaining <= b.remaining
}

/// First hop of `X-Forwarded-For`, else the socket peer, else `"unknown"`.
fn client_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Requests without a valid user id are only limited by address.
fn user_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let reset_at = Utc::now()
        + chrono::Duration::from_std(decision.reset_after).unwrap_or_else(|_| chrono::Duration::zero());
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(reset_at.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;
    use crate::rate_limit::{InMemoryRateLimitStore, RateLimitError, RateLimitStore};
    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode, routing::post, Router};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const USER: &str = "6f1f3c1e-9a51-4d1c-8a9e-0c5b7f1d2e3a";

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn check(
            &self,
            _key: &str,
            _window: Duration,
            _max_requests: u32,
        ) -> Result<RateLimitDecision, RateLimitError> {
            Err(RateLimitError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }

        async fn reset(&self, _key: &str) -> Result<(), RateLimitError> {
            Ok(())
        }
    }

    fn limiters(ip_max: u32, user_max: u32) -> RequestLimiters {
        let store: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimitStore::new());
        let settings = |max_requests| RateLimitSettings {
            max_requests,
            window: Duration::from_secs(60),
        };
        RequestLimiters {
            ip: RateLimiter::new(store.clone(), "ip", settings(ip_max)),
            user: RateLimiter::new(store, "user", settings(user_max)),
        }
    }

    fn app(limiters: RequestLimiters) -> Router {
        Router::new()
            .route("/generate", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(limiters, enforce_rate_limits))
    }

    fn request(ip: &str, user: Option<&str>) -> Request {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("x-forwarded-for", format!("{ip}, 10.0.0.1"));
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_carries_quota_headers() {
        let app = app(limiters(5, 3));
        let response = app.oneshot(request("1.2.3.4", Some(USER))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        // User quota is the tighter one
        assert_eq!(headers["x-ratelimit-limit"], "3");
        assert_eq!(headers["x-ratelimit-remaining"], "2");
        assert!(headers.contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn test_ip_limit_rejects_with_retry_after() {
        let app = app(limiters(2, 10));
        for _ in 0..2 {
            let response = app.clone().oneshot(request("1.2.3.4", None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request("1.2.3.4", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }

    #[tokio::test]
    async fn test_user_limit_applies_across_addresses() {
        let app = app(limiters(10, 1));
        let first = app.clone().oneshot(request("1.1.1.1", Some(USER))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request("2.2.2.2", Some(USER))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rejected_ip_does_not_consume_user_quota() {
        let limiters = limiters(1, 1);
        let app = app(limiters.clone());
        app.clone().oneshot(request("1.1.1.1", None)).await.unwrap();

        let blocked = app.clone().oneshot(request("1.1.1.1", Some(USER))).await.unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

        let elsewhere = app.oneshot(request("3.3.3.3", Some(USER))).await.unwrap();
        assert_eq!(elsewhere.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_user_id_is_ignored() {
        let app = app(limiters(10, 1));
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request("1.1.1.1", Some("not-a-uuid")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let store: Arc<dyn RateLimitStore> = Arc::new(FailingStore);
        let settings = RateLimitSettings {
            max_requests: 1,
            window: Duration::from_secs(60),
        };
        let app = app(RequestLimiters {
            ip: RateLimiter::new(store.clone(), "ip", settings),
            user: RateLimiter::new(store, "user", settings),
        });

        for _ in 0..3 {
            let response = app.clone().oneshot(request("1.1.1.1", Some(USER))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-limit"));
        }
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_then_unknown() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&req), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 5000))));
        assert_eq!(client_ip(&req), "192.168.1.7");
    }
}
