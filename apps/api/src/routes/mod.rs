pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::rate_limit::middleware::enforce_rate_limits;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Generation API, metered per client address and per user
    let ai = Router::new()
        .route("/fit-summary", post(handlers::handle_fit_summary))
        .route("/cover-letter", post(handlers::handle_cover_letter))
        .route("/resume-bullets", post(handlers::handle_resume_bullets))
        .route("/job-description", post(handlers::handle_job_description))
        .route("/rank-candidates", post(handlers::handle_rank_candidates))
        .route(
            "/screening-questions",
            post(handlers::handle_screening_questions),
        )
        .route("/image", post(handlers::handle_image))
        .route_layer(middleware::from_fn_with_state(
            state.limiters.clone(),
            enforce_rate_limits,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .nest("/api/v1/ai", ai)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::generation::cache::InMemoryCacheStore;
    use crate::generation::resilient::tests::ScriptedProvider;
    use crate::rate_limit::InMemoryRateLimitStore;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config(overrides: &[(&str, &str)]) -> Config {
        let mut vars: Vec<(String, String)> = vec![
            ("AI_RETRY_MAX_ATTEMPTS".to_string(), "1".to_string()),
            ("AI_RETRY_BASE_DELAY_MS".to_string(), "1".to_string()),
        ];
        vars.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Config::from_lookup(|key| {
            vars.iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn app_with(provider: ScriptedProvider, overrides: &[(&str, &str)]) -> Router {
        let state = AppState::new(
            &test_config(overrides),
            Arc::new(provider),
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(InMemoryRateLimitStore::new()),
        );
        build_router(state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn job_candidate() -> Value {
        json!({
            "job": { "title": "Data Engineer", "skills": ["Python", "Airflow"] },
            "candidate": { "name": "Grace", "skills": ["Python"] }
        })
    }

    #[tokio::test]
    async fn test_health_reports_closed_circuit() {
        let app = app_with(ScriptedProvider::always("unused"), &[]);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["circuit"]["phase"], "closed");
    }

    #[tokio::test]
    async fn test_fit_summary_route() {
        let app = app_with(ScriptedProvider::always("Good match."), &[]);
        let response = app
            .oneshot(post_json("/api/v1/ai/fit-summary", job_candidate()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        let body = json_body(response).await;
        assert_eq!(body["text"], "Good match.");
        assert_eq!(body["degraded"], false);
        assert!(body.get("warning").is_none());
    }

    #[tokio::test]
    async fn test_validation_error_is_400() {
        let app = app_with(ScriptedProvider::always("unused"), &[]);
        let response = app
            .oneshot(post_json("/api/v1/ai/job-description", json!({ "notes": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_503_with_manual_entry() {
        let app = app_with(ScriptedProvider::failing(), &[]);
        let response = app
            .oneshot(post_json("/api/v1/ai/cover-letter", job_candidate()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "GENERATION_UNAVAILABLE");
        assert_eq!(body["error"]["manual_entry"], true);
    }

    #[tokio::test]
    async fn test_rank_candidates_route() {
        let raw = r#"[{"candidateIndex":0,"score":61,"rationale":"ok"},{"candidateIndex":1,"score":88,"rationale":"great"}]"#;
        let app = app_with(ScriptedProvider::always(raw), &[]);
        let body = json!({
            "job": { "title": "Designer" },
            "applications": [
                { "candidate": { "name": "A", "skills": ["Figma"] } },
                { "candidate": { "name": "B", "skills": ["Figma", "Sketch"] }, "cover_letter": "Hi" }
            ]
        });
        let response = app
            .oneshot(post_json("/api/v1/ai/rank-candidates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["parse_mode"], "structured");
        assert_eq!(body["rankings"][0]["candidate_index"], 1);
        assert_eq!(body["rankings"][0]["score"], 88);
        assert_eq!(body["rankings"][1]["candidate_index"], 0);
    }

    #[tokio::test]
    async fn test_image_route_applies_defaults() {
        let app = app_with(ScriptedProvider::failing(), &[]);
        let response = app
            .oneshot(post_json(
                "/api/v1/ai/image",
                json!({ "prompt": "Warehouse team", "width": 800 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let url = body["url"].as_str().unwrap();
        assert!(url.contains("Warehouse%20team"));
        assert!(url.contains("width=800&height=630&seed=42&nologo=true"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_quota() {
        let app = app_with(
            ScriptedProvider::always("text"),
            &[("AI_IP_RATE_LIMIT_MAX", "2")],
        );
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json("/api/v1/ai/fit-summary", job_candidate()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(post_json("/api/v1/ai/fit-summary", job_candidate()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let app = app_with(
            ScriptedProvider::always("unused"),
            &[("AI_IP_RATE_LIMIT_MAX", "1")],
        );
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
