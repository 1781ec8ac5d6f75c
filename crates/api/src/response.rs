//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use redpanda::QueueStats;
use serde::{Deserialize, Serialize};
use sync_core::{Error, ErrorClass};
use telemetry::{ComponentHealthReport, HealthStatus, WorkerReport};

use crate::query::RefreshRequest;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub redpanda_connected: bool,
    pub postgres_connected: bool,
    pub esi_connected: bool,
    pub workers_alive: usize,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueuesResponse {
    pub queues: Vec<QueueStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub kind: String,
    pub id: i64,
    pub result: RefreshRequest,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type carrying the store/upstream error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_000", msg)
    }

    pub fn unavailable(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::SERVICE_UNAVAILABLE, code, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let code = err.error_code().unwrap_or(match err.class() {
            ErrorClass::Validation => "VALID_000",
            _ => "INTERNAL",
        });
        let status = match err.class() {
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Validation => StatusCode::BAD_REQUEST,
            ErrorClass::Duplicate => StatusCode::CONFLICT,
            ErrorClass::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::with_code(status, code, err.to_string())
    }
}
