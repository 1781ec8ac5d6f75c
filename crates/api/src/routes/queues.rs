//! Queue depth endpoint.

use axum::{extract::State, Json};
use redpanda::{all_queue_specs, QueueStats};
use telemetry::{health, WorkerReport};

use crate::response::{ApiError, QueuesResponse};
use crate::state::AppState;

/// GET /queues - Pending messages and live consumers per queue.
///
/// Pending is the distance from the stored checkpoint to the queue's
/// high watermark, so it also counts claimed but unsettled messages.
pub async fn queues_handler(State(state): State<AppState>) -> Result<Json<QueuesResponse>, ApiError> {
    let workers = health().workers.report();
    let mut queues = Vec::new();

    for spec in all_queue_specs(&state.topic_prefix) {
        let high = state.publisher.high_watermark(&spec.name).await?;
        let committed = state.store.queue_offset(&spec.name).await?.unwrap_or(0);
        queues.push(QueueStats {
            consumers: consumers_of(&state.topic_prefix, &spec.name, &workers),
            pending: (high - committed).max(0) as u64,
            queue: spec.name,
        });
    }

    Ok(Json(QueuesResponse { queues }))
}

/// Queue workers are named after their queue without the topic prefix.
fn consumers_of(prefix: &str, queue: &str, workers: &[WorkerReport]) -> u64 {
    workers
        .iter()
        .filter(|w| w.alive && format!("{}.{}", prefix, w.name) == queue)
        .count() as u64
}
