use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Length of every generated short code.
pub const SHORT_CODE_LENGTH: usize = 8;

/// A short code and the URL it resolves to. The target never changes once
/// the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UrlRecord {
    #[serde(rename = "short_link")]
    pub short_code: String,
    #[serde(rename = "link")]
    pub target_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
}

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
        }
    }
}
