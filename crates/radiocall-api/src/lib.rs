//! HTTP ingest server for the radio call transcription pipeline

pub mod handlers;
pub mod multipart;
pub mod processor;
pub mod routes;
pub mod security;
pub mod state;

pub use processor::TranscriberProcessor;
pub use state::AppState;

use axum::Router;
use std::sync::Arc;

/// Build the API router over an already constructed state
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::build_router().with_state(state)
}
