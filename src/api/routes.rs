use axum::{
    http::Method,
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    create_url, delete_url, get_url, health_check, list_urls, readiness_check, redirect_url,
    AppState,
};
use super::rate_limit::{enforce_rate_limit, RateLimiter};
use crate::error::handle_panic;

pub const API_PREFIX: &str = "/api/v1";

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::HEAD])
        .allow_headers(Any)
}

/// Shortener router. The rate limiter is only installed when one is given.
pub fn create_router(state: Arc<AppState>, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
    let router = Router::new()
        .route(API_PREFIX, get(list_urls).post(create_url))
        .route(&format!("{API_PREFIX}/"), get(list_urls).post(create_url))
        .route(&format!("{API_PREFIX}/health"), get(health_check))
        .route(&format!("{API_PREFIX}/readiness"), get(readiness_check))
        .route(&format!("{API_PREFIX}/redirect/{{code}}"), get(redirect_url))
        .route(&format!("{API_PREFIX}/{{code}}"), get(get_url).delete(delete_url))
        .route("/health", get(health_check))
        .route("/readiness", get(readiness_check))
        .with_state(state);

    let router = match rate_limiter {
        Some(limiter) => router.layer(middleware::from_fn_with_state(limiter, enforce_rate_limit)),
        None => router,
    };

    router
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}
