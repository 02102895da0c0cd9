//! API route definitions

use crate::{handlers, state::AppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

/// Build the ingest and read-path routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Upload endpoint - RdioScanner compatible
        .route(
            "/api/call-upload",
            post(handlers::upload::handle_call_upload),
        )
        // Call read paths
        .route("/api/calls", get(handlers::calls::list_calls))
        .route("/api/calls/:id", get(handlers::calls::get_call))
        .route(
            "/api/calls/:id/transcription",
            get(handlers::calls::get_call_transcription),
        )
        .route(
            "/api/calls/:id/segments",
            get(handlers::calls::get_call_segments),
        )
        .route(
            "/api/search/transcriptions",
            get(handlers::calls::search_transcriptions),
        )
        // Security audit read surface
        .route("/api/security/events", get(handlers::security::list_events))
        .route(
            "/api/security/sources/:system_id",
            get(handlers::security::analyze_source),
        )
        .layer(CompressionLayer::new())
}

/// Build health routes (no authentication)
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// Combine all routes into a single router
pub fn build_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(api_routes())
        .merge(health_routes())
        .fallback(not_found_handler)
}

/// Handle 404 Not Found errors
async fn not_found_handler() -> (axum::http::StatusCode, axum::Json<serde_json::Value>) {
    (
        axum::http::StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "error": "Not Found",
            "code": "ROUTE_NOT_FOUND",
            "message": "The requested endpoint does not exist"
        })),
    )
}
