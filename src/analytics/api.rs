//! Read-only HTTP API of the analytics service

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::models::{AnalyticsRecord, AnalyticsSummary};
use super::repository::AnalyticsRepository;
use crate::api::{cors_layer, health, API_PREFIX};
use crate::error::{handle_panic, ApiError};
use crate::models::ApiResponse;
use crate::validation::validate_short_code;

pub const SERVICE_NAME: &str = "analytics";

const NOT_FOUND_MESSAGE: &str = "No analytics entry for short link";

pub async fn get_analytics(
    State(repo): State<Arc<AnalyticsRepository>>,
    Path(short_link): Path<String>,
) -> Result<Json<ApiResponse<AnalyticsRecord>>, ApiError> {
    validate_short_code(&short_link)?;

    repo.get(&short_link)
        .await?
        .map(|record| Json(ApiResponse::data(record)))
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))
}

pub async fn get_summary(
    State(repo): State<Arc<AnalyticsRepository>>,
    Path(short_link): Path<String>,
) -> Result<Json<ApiResponse<AnalyticsSummary>>, ApiError> {
    validate_short_code(&short_link)?;

    repo.summary(&short_link)
        .await?
        .map(|summary| Json(ApiResponse::data(summary)))
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()))
}

async fn health_check() -> impl IntoResponse {
    health::health(SERVICE_NAME)
}

async fn readiness_check(State(repo): State<Arc<AnalyticsRepository>>) -> Response {
    health::readiness(SERVICE_NAME, repo.ping().await)
}

pub fn create_analytics_router(repo: Arc<AnalyticsRepository>) -> Router {
    Router::new()
        .route(&format!("{API_PREFIX}/health"), get(health_check))
        .route(&format!("{API_PREFIX}/readiness"), get(readiness_check))
        .route(&format!("{API_PREFIX}/{{short_link}}"), get(get_analytics))
        .route(&format!("{API_PREFIX}/{{short_link}}/summary"), get(get_summary))
        .route("/health", get(health_check))
        .route("/readiness", get(readiness_check))
        .with_state(repo)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}
