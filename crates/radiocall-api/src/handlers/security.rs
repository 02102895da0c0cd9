//! Security audit read surface

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use radiocall_core::types::{SecurityEvent, SecurityEventFilter, UploadSourceAnalysis};
use serde_json::json;
use std::sync::Arc;

type HandlerError = (StatusCode, Json<serde_json::Value>);

fn internal_error(e: &radiocall_core::Error) -> HandlerError {
    tracing::error!("Security read failure: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"status": "error", "message": "Internal server error"})),
    )
}

/// `GET /api/security/events` — filtered audit trail, newest first
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SecurityEventFilter>,
) -> Result<Json<Vec<SecurityEvent>>, HandlerError> {
    state
        .audit
        .query(&filter)
        .await
        .map(Json)
        .map_err(|e| internal_error(&e))
}

/// `GET /api/security/sources/:system_id` — upload source analysis
pub async fn analyze_source(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<String>,
) -> Result<Json<UploadSourceAnalysis>, HandlerError> {
    state
        .audit
        .analyze_source(&system_id)
        .await
        .map(Json)
        .map_err(|e| internal_error(&e))
}
