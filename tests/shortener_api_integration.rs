//! Shortener HTTP API integration tests
//!
//! These drive the full router (rate limiting, CORS, error mapping) against
//! an in-memory SQLite store.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use linkpulse::api::{create_router, AppState, RateLimiter, TrustedProxies};
use linkpulse::config::{AnalyticsClientConfig, CacheConfig, RateLimitConfig};
use linkpulse::rpc::{ClickRecorder, DisabledRecorder, ResilientAnalyticsClient};
use linkpulse::shortener::ShortenerService;
use linkpulse::storage::{SqliteStorage, UrlRepository, UrlStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn create_app_with(recorder: Arc<dyn ClickRecorder>, limits: Option<RateLimitConfig>) -> Router {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let cache = CacheConfig {
        sweep_interval_secs: 0,
        ..CacheConfig::default()
    };
    let repository = Arc::new(UrlRepository::new(Arc::new(storage), &cache));
    let trusted_proxies = Arc::new(TrustedProxies::default());

    let limiter = limits.map(|config| Arc::new(RateLimiter::new(config, Arc::clone(&trusted_proxies))));
    let state = Arc::new(AppState {
        service: Arc::new(ShortenerService::new(repository, recorder)),
        trusted_proxies,
    });

    create_router(state, limiter)
}

async fn create_app() -> Router {
    create_app_with(Arc::new(DisabledRecorder), None).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn post_url(url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "url": url }).to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_create_get_delete_lifecycle() {
    let app = create_app().await;

    let (status, json) = send(&app, post_url("https://example.com")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    let code = json["data"]["short_link"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);

    let (status, json) = send(&app, get(&format!("/api/v1/{code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["link"], "https://example.com/");

    let (status, json) = send(&app, delete(&format!("/api/v1/{code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "success": true }));

    let (status, json) = send(&app, get(&format!("/api/v1/{code}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_same_url_returns_same_code() {
    let app = create_app().await;

    let (_, first) = send(&app, post_url("https://example.com/page")).await;
    let (status, second) = send(&app, post_url("https://example.com/page")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["short_link"], second["data"]["short_link"]);

    let (_, list) = send(&app, get("/api/v1")).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ssrf_and_invalid_urls_are_rejected() {
    let app = create_app().await;

    for url in [
        "http://127.0.0.1/x",
        "http://localhost:8080/",
        "http://169.254.169.254/latest/meta-data",
        "ftp://example.com/file",
        "https://example.com/?q=<script>alert(1)</script>",
        "",
    ] {
        let (status, json) = send(&app, post_url(url)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "url: {url}");
        assert_eq!(json["error"], "validation_error");
    }

    let (_, list) = send(&app, get("/api/v1/")).await;
    assert!(list["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_are_422_json() {
    let app = create_app().await;

    for body in [r#"{}"#, r#"{"url": 5}"#, r#"{"url": "#, "not json"] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {body}");
        assert_eq!(json["success"], false, "body: {body}");
        assert_eq!(json["error"], "validation_error", "body: {body}");
        assert!(!json["message"].as_str().unwrap().contains("line"), "body: {body}");
    }
}

#[tokio::test]
async fn test_redirect_returns_302_with_location() {
    let app = create_app().await;
    let (_, json) = send(&app, post_url("https://example.com/target")).await;
    let code = json["data"]["short_link"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/redirect/{code}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/target"
    );

    let (status, _) = send(&app, get("/api/v1/redirect/Missing1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_code_is_422() {
    let app = create_app().await;

    let (status, json) = send(&app, get("/api/v1/abc")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_lookup_succeeds_when_analytics_is_unreachable() {
    let config = AnalyticsClientConfig {
        endpoint: "http://127.0.0.1:1".to_string(),
        timeout_ms: 50,
        ..AnalyticsClientConfig::default()
    };
    let client = ResilientAnalyticsClient::from_config(&config).unwrap();
    let app = create_app_with(Arc::new(client), None).await;

    let (_, json) = send(&app, post_url("https://example.com/")).await;
    let code = json["data"]["short_link"].as_str().unwrap();

    let (status, json) = send(&app, get(&format!("/api/v1/{code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["link"], "https://example.com/");
}

#[tokio::test]
async fn test_health_and_readiness_at_root_and_prefix() {
    let app = create_app().await;

    for uri in ["/health", "/api/v1/health"] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "status": "ok", "service": "shortener" }));
    }

    for uri in ["/readiness", "/api/v1/readiness"] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["dependencies"]["database"], "ok");
    }
}

#[tokio::test]
async fn test_creation_is_rate_limited() {
    let limits = RateLimitConfig {
        create_per_minute: 2,
        ..RateLimitConfig::default()
    };
    let app = create_app_with(Arc::new(DisabledRecorder), Some(limits)).await;

    for i in 0..2 {
        let response = app
            .clone()
            .oneshot(post_url(&format!("https://example.com/{i}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (1 - i).to_string().as_str()
        );
        assert_eq!(response.headers()["x-ratelimit-window"], "60");
    }

    let response = app
        .clone()
        .oneshot(post_url("https://example.com/3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Too many requests. Limit: 2 per 60 seconds");

    // Reads use a different budget
    let (status, _) = send(&app, get("/api/v1/")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let app = create_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/")
                .header(header::ORIGIN, "https://frontend.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
