//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the chat widget and the API server.
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use speakfree_core::domain::{
    DiscussionMessage, DiscussionThread, ReportStatusView, TranscriptEntry,
};
use speakfree_core::{AttachmentOutcome, MessageOutcome, SessionStarted};
use utoipa::ToSchema;

//=========================================================================================
// Requests FROM the Client
//=========================================================================================

#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// The school code, when the widget already knows it (e.g. from a QR code).
    #[serde(default)]
    pub school_code: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub message: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostDiscussionMessageRequest {
    pub content: String,
    /// `student` (default) or `school`.
    #[serde(default)]
    pub sender: Option<String>,
}

//=========================================================================================
// Responses TO the Client
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
    pub reply: String,
    pub step: String,
}

impl From<SessionStarted> for StartSessionResponse {
    fn from(started: SessionStarted) -> Self {
        Self {
            step: started.step.name().to_string(),
            session_id: started.session_id,
            reply: started.reply,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub reply: String,
    pub step: String,
    pub finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussion_code: Option<String>,
}

impl From<MessageOutcome> for MessageResponse {
    fn from(outcome: MessageOutcome) -> Self {
        Self {
            step: outcome.step.name().to_string(),
            reply: outcome.reply,
            finalized: outcome.finalized,
            tracking_code: outcome.tracking_code,
            discussion_code: outcome.discussion_code,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub reply: String,
    pub step: String,
    pub attachment_count: usize,
    pub accepted: bool,
    pub file_name: String,
}

impl AttachmentResponse {
    pub fn new(outcome: AttachmentOutcome, file_name: String) -> Self {
        Self {
            step: outcome.step.name().to_string(),
            reply: outcome.reply,
            attachment_count: outcome.attachment_count,
            accepted: outcome.accepted,
            file_name,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    /// `user` or `assistant`.
    pub sender: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TranscriptEntry> for TranscriptMessage {
    fn from(entry: TranscriptEntry) -> Self {
        Self {
            sender: entry.sender.as_str().to_string(),
            text: entry.text,
            file_ref: entry.file_ref,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<TranscriptMessage>,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusResponse {
    pub tracking_code: String,
    pub category: String,
    pub category_label: String,
    pub status: String,
    pub school_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<ReportStatusView> for ReportStatusResponse {
    fn from(view: ReportStatusView) -> Self {
        Self {
            tracking_code: view.tracking_code,
            category: view.category.as_str().to_string(),
            category_label: view.category.label().to_string(),
            status: view.status.as_str().to_string(),
            school_name: view.school_name,
            created_at: view.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionMessageBody {
    /// `student` or `school`.
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<DiscussionMessage> for DiscussionMessageBody {
    fn from(message: DiscussionMessage) -> Self {
        Self {
            sender: message.sender.as_str().to_string(),
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionResponse {
    pub discussion_code: String,
    pub tracking_code: String,
    pub category: String,
    pub report_status: String,
    pub school_name: String,
    pub status: String,
    pub messages: Vec<DiscussionMessageBody>,
}

impl From<DiscussionThread> for DiscussionResponse {
    fn from(thread: DiscussionThread) -> Self {
        Self {
            discussion_code: thread.discussion_code,
            tracking_code: thread.tracking_code,
            category: thread.category.as_str().to_string(),
            report_status: thread.report_status.as_str().to_string(),
            school_name: thread.school_name,
            status: thread.status.as_str().to_string(),
            messages: thread.messages.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// The body of every error response.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}
