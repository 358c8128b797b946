use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::extract::ClickContext;
use super::health;
use super::ip_extractor::TrustedProxies;
use crate::error::ApiError;
use crate::models::{ApiResponse, CreateUrlRequest, UrlRecord};
use crate::shortener::ShortenerService;

pub const SERVICE_NAME: &str = "shortener";

pub struct AppState {
    pub service: Arc<ShortenerService>,
    pub trusted_proxies: Arc<TrustedProxies>,
}

/// Shorten a URL
pub async fn create_url(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUrlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<UrlRecord>>), ApiError> {
    let Json(payload) = payload?;
    let record = state.service.shorten(&payload.url).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::data(record))))
}

pub async fn list_urls(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<UrlRecord>>>, ApiError> {
    let records = state.service.list().await?;
    Ok(Json(ApiResponse::data(records)))
}

/// Resolve a short code to its record. Counts as a click.
pub async fn get_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ClickContext(click): ClickContext,
) -> Result<Json<ApiResponse<UrlRecord>>, ApiError> {
    let record = state.service.resolve(&code, click).await?;
    Ok(Json(ApiResponse::data(record)))
}

pub async fn delete_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.service.delete(&code).await?;
    Ok(Json(ApiResponse::ok()))
}

/// 302 to the target URL
pub async fn redirect_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ClickContext(click): ClickContext,
) -> Result<Response, ApiError> {
    let record = state.service.resolve(&code, click).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, record.target_url)]).into_response())
}

pub async fn health_check() -> impl IntoResponse {
    health::health(SERVICE_NAME)
}

pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    health::readiness(SERVICE_NAME, state.service.ping().await)
}
