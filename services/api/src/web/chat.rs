//! services/api/src/web/chat.rs
//!
//! The Axum handlers for the intake conversation: start, message, attachment,
//! history and end.

use crate::web::errors::{bad_request, from_intake, from_port, HttpError};
use crate::web::protocol::{
    AttachmentResponse, ErrorBody, HistoryResponse, MessageResponse, PostMessageRequest,
    StartSessionRequest, StartSessionResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use speakfree_core::domain::Attachment;
use speakfree_core::uploads::mime_for_extension;
use std::sync::Arc;
use tracing::{info, warn};

/// The multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

/// Start a new intake conversation.
///
/// The body is optional; when it carries a `schoolCode` the conversation skips
/// straight to the narrative.
#[utoipa::path(
    post,
    path = "/chat/sessions",
    request_body(content = StartSessionRequest, description = "Optional school code; the body may be empty."),
    responses(
        (status = 201, description = "Conversation started", body = StartSessionResponse),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 503, description = "A backing service is unavailable", body = ErrorBody)
    ),
    tag = "Chat"
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let request: StartSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("Invalid request body: {}", e)))?
    };

    let started = app_state
        .engine
        .start_session(request.school_code.as_deref())
        .await
        .map_err(from_intake)?;
    Ok((StatusCode::CREATED, Json(StartSessionResponse::from(started))))
}

/// Send one reporter message to the conversation.
#[utoipa::path(
    post,
    path = "/chat/sessions/{session_id}/messages",
    request_body = PostMessageRequest,
    params(("session_id" = String, Path, description = "The conversation id.")),
    responses(
        (status = 200, description = "The assistant's reply", body = MessageResponse),
        (status = 400, description = "Missing session id", body = ErrorBody),
        (status = 404, description = "Unknown conversation", body = ErrorBody),
        (status = 410, description = "Conversation ended", body = ErrorBody),
        (status = 503, description = "Retryable failure, nothing was lost", body = ErrorBody)
    ),
    tag = "Chat"
)]
pub async fn post_message_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<Json<MessageResponse>, HttpError> {
    let outcome = app_state
        .engine
        .post_message(&session_id, &request.message)
        .await
        .map_err(from_intake)?;
    Ok(Json(outcome.into()))
}

/// Upload one evidence file to the conversation.
///
/// Accepts a multipart/form-data request with a `file` part.
#[utoipa::path(
    post,
    path = "/chat/sessions/{session_id}/attachments",
    request_body(content_type = "multipart/form-data", description = "The evidence file, in a `file` part."),
    params(("session_id" = String, Path, description = "The conversation id.")),
    responses(
        (status = 200, description = "The file was accepted or politely refused", body = AttachmentResponse),
        (status = 400, description = "Missing, empty, oversized or unsupported file", body = ErrorBody),
        (status = 404, description = "Unknown conversation", body = ErrorBody),
        (status = 503, description = "Retryable failure", body = ErrorBody)
    ),
    tag = "Chat"
)]
pub async fn post_attachment_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<AttachmentResponse>, HttpError> {
    let (original_name, data) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(format!("Failed to read multipart data: {}", e)))?
            .ok_or_else(|| bad_request("Multipart form must include a `file` part"))?;
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read file bytes: {}", e)))?;
        break (name, data);
    };

    let extension = app_state
        .upload_policy
        .validate(&original_name, data.len() as u64)
        .map_err(|rejection| {
            info!(session_id = %session_id, "Upload rejected: {}", rejection);
            bad_request(format!("File rejected: {}", rejection))
        })?;

    let stored = app_state
        .storage
        .store(&original_name, &data)
        .await
        .map_err(from_port)?;

    let attachment = Attachment {
        storage_ref: stored.storage_ref.clone(),
        original_name: original_name.clone(),
        mime_type: mime_for_extension(&extension).to_string(),
        size_bytes: stored.size_bytes,
    };

    let result = app_state.engine.post_attachment(&session_id, attachment).await;
    let keep_file = matches!(&result, Ok(outcome) if outcome.accepted);
    if !keep_file {
        if let Err(e) = app_state.storage.remove(&stored.storage_ref).await {
            warn!(storage_ref = %stored.storage_ref, "Failed to remove refused upload: {}", e);
        }
    }

    let outcome = result.map_err(from_intake)?;
    Ok(Json(AttachmentResponse::new(outcome, original_name)))
}

/// The transcript of a conversation, oldest first.
#[utoipa::path(
    get,
    path = "/chat/sessions/{session_id}/history",
    params(("session_id" = String, Path, description = "The conversation id.")),
    responses(
        (status = 200, description = "The transcript", body = HistoryResponse),
        (status = 404, description = "Unknown conversation", body = ErrorBody)
    ),
    tag = "Chat"
)]
pub async fn history_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, HttpError> {
    let entries = app_state
        .engine
        .history(&session_id)
        .await
        .map_err(from_intake)?;
    Ok(Json(HistoryResponse {
        session_id,
        messages: entries.into_iter().map(Into::into).collect(),
    }))
}

/// End a conversation. Further messages are refused.
#[utoipa::path(
    delete,
    path = "/chat/sessions/{session_id}",
    params(("session_id" = String, Path, description = "The conversation id.")),
    responses(
        (status = 204, description = "Conversation ended"),
        (status = 404, description = "Unknown conversation", body = ErrorBody)
    ),
    tag = "Chat"
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, HttpError> {
    app_state
        .engine
        .end_session(&session_id)
        .await
        .map_err(from_intake)?;
    Ok(StatusCode::NO_CONTENT)
}
