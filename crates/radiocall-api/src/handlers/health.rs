//! Health endpoint

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

/// `GET /health` — database ping plus queue liveness
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .is_ok();
    let queue_stats = state.queue.stats();

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "database": if database_ok { "ok" } else { "unavailable" },
            "queue": {
                "running": queue_stats.is_running,
                "size": queue_stats.queue_size,
                "workers": queue_stats.workers_running,
            },
            "timestamp": chrono::Utc::now(),
        })),
    )
}
