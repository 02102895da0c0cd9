//! Read paths over stored calls and transcriptions

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use radiocall_core::Error;
use radiocall_core::types::{
    PaginatedSearchResponse, RadioCall, SearchQuery, SpeakerSegment, Transcription,
};
use radiocall_database::{CallQueries, SegmentQueries, TranscriptionQueries};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Paginated call listing
#[derive(Debug, Serialize)]
pub struct CallListResponse {
    /// Result rows
    pub calls: Vec<RadioCall>,

    /// Approximate total: `offset + calls.len()`
    pub total: i64,

    /// Limit applied
    pub limit: i64,

    /// Offset applied
    pub offset: i64,
}

type HandlerError = (StatusCode, Json<serde_json::Value>);

fn map_error(e: &Error) -> HandlerError {
    let status = match e {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => {
            tracing::error!("Read path failure: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = if status == StatusCode::NOT_FOUND {
        e.to_string()
    } else {
        "Internal server error".to_string()
    };
    (status, Json(json!({"status": "error", "message": message})))
}

/// `GET /api/calls` — filtered, paged listing, newest first
pub async fn list_calls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<CallListResponse>, HandlerError> {
    let calls = CallQueries::search(&state.pool, &query)
        .await
        .map_err(|e| map_error(&e))?;

    #[allow(clippy::cast_possible_wrap)]
    let total = query.effective_offset() + calls.len() as i64;

    Ok(Json(CallListResponse {
        total,
        limit: query.effective_limit(),
        offset: query.effective_offset(),
        calls,
    }))
}

/// `GET /api/calls/:id`
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<RadioCall>, HandlerError> {
    CallQueries::get(&state.pool, call_id)
        .await
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// `GET /api/calls/:id/transcription`
pub async fn get_call_transcription(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<Transcription>, HandlerError> {
    TranscriptionQueries::get(&state.pool, call_id)
        .await
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// `GET /api/calls/:id/segments` — ordered by start time
pub async fn get_call_segments(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<Vec<SpeakerSegment>>, HandlerError> {
    SegmentQueries::for_call(&state.pool, call_id)
        .await
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// `GET /api/search/transcriptions` — full-text search over transcripts
pub async fn search_transcriptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PaginatedSearchResponse>, HandlerError> {
    let results = TranscriptionQueries::search(&state.pool, &query)
        .await
        .map_err(|e| map_error(&e))?;

    #[allow(clippy::cast_possible_wrap)]
    let total = query.effective_offset() + results.len() as i64;

    Ok(Json(PaginatedSearchResponse {
        total,
        limit: query.effective_limit(),
        offset: query.effective_offset(),
        query: query.query_text.clone().unwrap_or_default(),
        results,
    }))
}
