use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::shortener::ShortenerError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

const INTERNAL_MESSAGE: &str = "An internal error occurred";
const INVALID_BODY_MESSAGE: &str = "Request body must be a JSON object with a string 'url' field";

/// Error type of every HTTP handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl ErrorBody {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            message: message.into(),
            error_id: None,
        }
    }

    /// Generic 500 body carrying a fresh correlation id
    fn internal() -> (Self, Uuid) {
        let error_id = Uuid::new_v4();
        let body = Self {
            error_id: Some(error_id.to_string()),
            ..Self::new("internal_error", INTERNAL_MESSAGE)
        };
        (body, error_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody::new("validation_error", message),
            ),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorBody::new("not_found", message))
            }
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody::new("service_unavailable", message),
            ),
            ApiError::Internal(err) => {
                let (body, error_id) = ErrorBody::internal();
                error!(error_id = %error_id, error = format!("{err:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

/// Body rejections keep serde's wording out of the response.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), reason = %rejection.body_text(), "rejected request body");
        ApiError::Validation(INVALID_BODY_MESSAGE.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<ShortenerError> for ApiError {
    fn from(err: ShortenerError) -> Self {
        match err {
            ShortenerError::Validation(err) => err.into(),
            ShortenerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ShortenerError::Storage(err) => err.into(),
            ShortenerError::CollisionExhausted { .. } => ApiError::Internal(err.into()),
        }
    }
}

/// Turns a handler panic into the generic 500 body.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    let (body, error_id) = ErrorBody::internal();
    error!(error_id = %error_id, panic = %detail, "handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
