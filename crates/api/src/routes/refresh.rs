//! Manual refresh of organizations and individuals.

use axum::{
    extract::{Path, State},
    Json,
};
use sync_core::EntityKind;

use crate::response::{ApiError, RefreshResponse};
use crate::state::AppState;

/// POST /refresh/:kind/:id - Queue a high-priority refetch.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let kind: EntityKind = kind
        .parse()
        .map_err(|e: sync_core::Error| ApiError::bad_request(e.to_string()))?;
    let result = state.queries.request_refresh(kind, id).await?;

    Ok(Json(RefreshResponse {
        kind: kind.as_str().to_string(),
        id,
        result,
    }))
}
