//! Health check endpoints.

use axum::{http::StatusCode, Json};
use telemetry::health;

use crate::response::{HealthResponse, WorkersResponse};

/// GET /health - Full health check.
pub async fn health_handler() -> Json<HealthResponse> {
    let report = health().report();
    let workers_alive = health()
        .workers
        .report()
        .iter()
        .filter(|w| w.alive)
        .count();

    Json(HealthResponse {
        status: report.status,
        redpanda_connected: health().redpanda.is_healthy(),
        postgres_connected: health().postgres.is_healthy(),
        esi_connected: health().esi.is_healthy(),
        workers_alive,
        components: report.components,
    })
}

/// GET /health/ready - Readiness check (broker and store reachable).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness check (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/workers - Heartbeat age of every worker loop.
///
/// Answers 503 when any registered worker has gone quiet.
pub async fn workers_handler() -> (StatusCode, Json<WorkersResponse>) {
    let workers = health().workers.report();
    let status = if workers.iter().all(|w| w.alive) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(WorkersResponse { workers }))
}
