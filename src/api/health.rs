//! Liveness and readiness bodies shared by both services

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::warn;

const OK: &str = "ok";
const ERROR: &str = "error";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Dependencies {
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessBody {
    pub status: String,
    pub service: String,
    pub dependencies: Dependencies,
}

pub fn health(service: &str) -> Json<HealthBody> {
    Json(HealthBody {
        status: OK.to_string(),
        service: service.to_string(),
    })
}

/// 200 when the database answered the ping, 503 otherwise.
pub fn readiness<E: Display>(service: &str, database: Result<(), E>) -> Response {
    let (status, state) = match database {
        Ok(()) => (StatusCode::OK, OK),
        Err(err) => {
            warn!(service, error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, ERROR)
        }
    };

    let body = ReadinessBody {
        status: state.to_string(),
        service: service.to_string(),
        dependencies: Dependencies {
            database: state.to_string(),
        },
    };

    (status, Json(body)).into_response()
}
