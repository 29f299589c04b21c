//! services/api/src/web/rest.rs
//!
//! Contains the follow-up endpoints (tracking lookup and the anonymous discussion),
//! the health check, and the master definition for the OpenAPI specification.

use crate::web::chat;
use crate::web::errors::{bad_request, from_port, HttpError};
use crate::web::protocol::{
    AttachmentResponse, DiscussionMessageBody, DiscussionResponse, ErrorBody, HealthResponse,
    HistoryResponse, MessageResponse, PostDiscussionMessageRequest, PostMessageRequest,
    ReportStatusResponse, StartSessionRequest, StartSessionResponse, TranscriptMessage,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use speakfree_core::domain::DiscussionSender;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat::start_session_handler,
        chat::post_message_handler,
        chat::post_attachment_handler,
        chat::history_handler,
        chat::end_session_handler,
        track_report_handler,
        get_discussion_handler,
        post_discussion_message_handler,
        health_handler,
    ),
    components(
        schemas(
            StartSessionRequest,
            StartSessionResponse,
            PostMessageRequest,
            MessageResponse,
            AttachmentResponse,
            HistoryResponse,
            TranscriptMessage,
            ReportStatusResponse,
            DiscussionResponse,
            DiscussionMessageBody,
            PostDiscussionMessageRequest,
            HealthResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "Chat", description = "The anonymous intake conversation with Haniel."),
        (name = "Follow-up", description = "Report tracking and the anonymous discussion with the school."),
        (name = "SpeakFree Intake API", description = "Service endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Follow-up Handlers
//=========================================================================================

/// Look up a report's status by its tracking code.
#[utoipa::path(
    get,
    path = "/reports/track/{tracking_code}",
    params(("tracking_code" = String, Path, description = "The RPT- code given at the end of the chat.")),
    responses(
        (status = 200, description = "Report status", body = ReportStatusResponse),
        (status = 404, description = "No report with that code", body = ErrorBody)
    ),
    tag = "Follow-up"
)]
pub async fn track_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(tracking_code): Path<String>,
) -> Result<Json<ReportStatusResponse>, HttpError> {
    let view = app_state
        .reports
        .find_by_tracking_code(&tracking_code)
        .await
        .map_err(from_port)?;
    Ok(Json(view.into()))
}

/// Read the discussion thread attached to a report.
#[utoipa::path(
    get,
    path = "/discussions/{discussion_code}",
    params(("discussion_code" = String, Path, description = "The DSC- code given at the end of the chat.")),
    responses(
        (status = 200, description = "The thread and its messages", body = DiscussionResponse),
        (status = 404, description = "No discussion with that code", body = ErrorBody)
    ),
    tag = "Follow-up"
)]
pub async fn get_discussion_handler(
    State(app_state): State<Arc<AppState>>,
    Path(discussion_code): Path<String>,
) -> Result<Json<DiscussionResponse>, HttpError> {
    let thread = app_state
        .reports
        .get_discussion(&discussion_code)
        .await
        .map_err(from_port)?;
    Ok(Json(thread.into()))
}

/// Post a message to a discussion thread.
#[utoipa::path(
    post,
    path = "/discussions/{discussion_code}/messages",
    request_body = PostDiscussionMessageRequest,
    params(("discussion_code" = String, Path, description = "The DSC- code given at the end of the chat.")),
    responses(
        (status = 201, description = "Message posted", body = DiscussionMessageBody),
        (status = 400, description = "Empty content or unknown sender", body = ErrorBody),
        (status = 404, description = "No discussion with that code", body = ErrorBody),
        (status = 409, description = "The discussion is closed", body = ErrorBody)
    ),
    tag = "Follow-up"
)]
pub async fn post_discussion_message_handler(
    State(app_state): State<Arc<AppState>>,
    Path(discussion_code): Path<String>,
    Json(request): Json<PostDiscussionMessageRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let sender = match request.sender.as_deref() {
        None => DiscussionSender::Student,
        Some(raw) => DiscussionSender::parse(raw)
            .ok_or_else(|| bad_request(format!("Unknown sender '{}'", raw)))?,
    };

    let message = app_state
        .reports
        .post_discussion_message(&discussion_code, sender, &request.content)
        .await
        .map_err(from_port)?;

    info!(sender = sender.as_str(), "Discussion message posted");
    Ok((StatusCode::CREATED, Json(DiscussionMessageBody::from(message))))
}

//=========================================================================================
// Health
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = HealthResponse)),
    tag = "SpeakFree Intake API"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
