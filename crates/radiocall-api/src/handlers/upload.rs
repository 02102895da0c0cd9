//! RdioScanner-compatible call upload endpoint
//!
//! `POST /api/call-upload`. Parses the multipart body with the manual
//! parser, authenticates, validates, materializes the payload and
//! enqueues a transcription task. Response bodies and status codes follow
//! the RdioScanner contract exactly; recorders are picky about them.

use crate::multipart::{self, MultipartForm, UploadedFile};
use crate::security::RequestContext;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use radiocall_core::Error;
use radiocall_core::types::RadioCallCreate;
use radiocall_core::utils::{generate_storage_filename, lowercase_extension};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle a multipart call upload from a field recorder
pub async fn handle_call_upload(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_ip = client_ip(&headers, connect_info);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let wants_json = wants_json(&headers);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !content_type.starts_with("multipart/form-data") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Request must have Content-Type: multipart/form-data",
            wants_json,
        );
    }

    let form = match multipart::parse(content_type, &body) {
        Ok(form) => form,
        Err(e) => {
            warn!(client_ip = %client_ip, "Multipart parse failure: {e}");
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid multipart data: {e}"),
                wants_json,
            );
        }
    };

    // Diagnostic probe: recorders send `test` to verify connectivity
    // before any credentials or audio are involved
    if form.nonempty_field("test").is_some() {
        info!(system = form.field("system"), "Test request received");
        let message = "incomplete call data: no talkgroup";
        return if wants_json {
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "message": message,
                    "callId": "test"
                })),
            )
                .into_response()
        } else {
            plain_text(StatusCode::OK, message)
        };
    }

    let system = form.nonempty_field("system").map(String::from);
    let ctx = RequestContext {
        client_ip: &client_ip,
        system_id: system.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    let outcome = match state.auth.validate(form.field("key"), ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(client_ip = %client_ip, "API key validation failed: {e}");
            return error_response(StatusCode::UNAUTHORIZED, &e.to_string(), wants_json);
        }
    };

    // Required fields for a real call
    let Some(system) = system else {
        return error_response(StatusCode::BAD_REQUEST, "System ID is required", wants_json);
    };
    let ctx = RequestContext {
        client_ip: &client_ip,
        system_id: Some(&system),
        user_agent: user_agent.as_deref(),
    };

    let Some(date_time) = form.nonempty_field("dateTime") else {
        return error_response(StatusCode::BAD_REQUEST, "DateTime is required", wants_json);
    };

    let Some(audio) = form.file("audio") else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Audio file is required for non-test requests",
            wants_json,
        );
    };

    let filename = form
        .nonempty_field("audioName")
        .unwrap_or(&audio.filename)
        .to_string();
    let declared_mime = form
        .nonempty_field("audioType")
        .or(Some(audio.content_type.as_str()))
        .filter(|m| !m.is_empty());

    if state.config.ingest.enable_file_validation {
        if let Err(e) = state.limiter.check(&client_ip) {
            if let Error::RateLimited {
                window,
                current,
                limit,
            } = &e
            {
                state
                    .auth
                    .log_rate_limit_violation(ctx, *window, *current, *limit)
                    .await;
            }
            state
                .auth
                .log_upload_attempt(
                    ctx,
                    outcome.api_key_id.as_deref(),
                    Some(&filename),
                    false,
                    Some(&e.to_string()),
                )
                .await;
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("File validation failed: {e}"),
                wants_json,
            );
        }

        match state
            .validator
            .validate(&filename, declared_mime, &audio.data)
        {
            Ok(()) => {
                state
                    .auth
                    .log_upload_attempt(
                        ctx,
                        outcome.api_key_id.as_deref(),
                        Some(&filename),
                        true,
                        None,
                    )
                    .await;
            }
            Err(e) => {
                state
                    .auth
                    .log_upload_attempt(
                        ctx,
                        outcome.api_key_id.as_deref(),
                        Some(&filename),
                        false,
                        Some(&e.to_string()),
                    )
                    .await;
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("File validation failed: {e}"),
                    wants_json,
                );
            }
        }
    }

    if audio.data.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Empty audio file", wants_json);
    }

    // Materialize the payload with a unique name keeping the extension
    let stored_path = state.incoming_dir.join(generate_storage_filename(&filename));
    if let Err(e) = tokio::fs::write(&stored_path, &audio.data).await {
        error!(path = %stored_path.display(), "Failed to write payload: {e}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            wants_json,
        );
    }

    let call = build_call(
        &form,
        audio,
        &filename,
        date_time,
        &stored_path,
        &client_ip,
        &system,
        outcome.api_key_id.as_deref(),
        user_agent.as_deref(),
    );

    info!(
        system = %system,
        talkgroup = call.talkgroup_id,
        frequency = call.frequency,
        file = %filename,
        "Received call"
    );

    match state.queue.try_enqueue(call.clone(), stored_path.clone()) {
        Ok(task_id) => {
            info!(task_id = %task_id, call_id = %call.call_id, "Call queued for transcription");
        }
        Err(Error::QueueFull) if state.config.ingest.inline_fallback => {
            // Saturation alone must never fail the client; transcribe in
            // the request instead
            warn!(call_id = %call.call_id, "Task queue full, transcribing inline");
            if let Err(e) = state.transcriber.transcribe(&stored_path, &call).await {
                error!(call_id = %call.call_id, "Inline transcription failed: {e}");
                let _ = tokio::fs::remove_file(&stored_path).await;
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    wants_json,
                );
            }
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(&stored_path).await;
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                wants_json,
            );
        }
    }

    if wants_json {
        let call_id = if filename.is_empty() {
            "unknown"
        } else {
            &filename
        };
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "Call received and queued for transcription",
                "callId": call_id
            })),
        )
            .into_response()
    } else {
        plain_text(StatusCode::OK, "Call imported successfully.")
    }
}

/// Build the call record with upload provenance
#[allow(clippy::too_many_arguments)]
fn build_call(
    form: &MultipartForm,
    audio: &UploadedFile,
    filename: &str,
    date_time: &str,
    stored_path: &Path,
    client_ip: &str,
    system: &str,
    api_key_id: Option<&str>,
    user_agent: Option<&str>,
) -> RadioCallCreate {
    let timestamp = date_time
        .parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    let frequency = form
        .nonempty_field("frequency")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    let mut call =
        RadioCallCreate::new(timestamp, frequency, stored_path.display().to_string());
    call.talkgroup_id = form
        .nonempty_field("talkgroup")
        .and_then(|v| v.parse::<i32>().ok());
    call.source_radio_id = form
        .nonempty_field("source")
        .and_then(|v| v.parse::<i32>().ok());
    call.system_id = system.parse::<i32>().ok();
    call.system_label = form.nonempty_field("systemLabel").map(String::from);
    call.talkgroup_label = form.nonempty_field("talkgroupLabel").map(String::from);
    call.talkgroup_group = form.nonempty_field("talkgroupGroup").map(String::from);
    call.talker_alias = form.nonempty_field("talkerAlias").map(String::from);

    let extension = lowercase_extension(filename);
    call.audio_format = if extension.is_empty() {
        lowercase_extension(&audio.filename)
    } else {
        extension
    };
    if call.audio_format.is_empty() {
        call.audio_format = "mp3".to_string();
    }

    call.upload_source_ip = Some(client_ip.to_string());
    call.upload_source_system = Some(system.to_string());
    call.upload_api_key_id = api_key_id.map(String::from);
    call.upload_user_agent = user_agent.map(String::from);

    call
}

/// Client IP: first X-Forwarded-For entry, else the transport peer
fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    connect_info.map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

/// JSON when the Accept header asks for it or the client looks like a
/// test harness; text/plain otherwise (recorder default)
fn wants_json(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    accept.contains("application/json") || user_agent.contains("test")
}

fn plain_text(status: StatusCode, body: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain")],
        body.to_string(),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str, wants_json: bool) -> Response {
    if wants_json {
        (
            status,
            Json(json!({
                "status": "error",
                "message": message
            })),
        )
            .into_response()
    } else {
        plain_text(status, message)
    }
}
