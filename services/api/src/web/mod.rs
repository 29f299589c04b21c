pub mod chat;
pub mod errors;
pub mod janitor;
pub mod protocol;
pub mod rest;
pub mod state;


use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use chat::{
    end_session_handler, history_handler, post_attachment_handler, post_message_handler,
    start_session_handler,
};
pub use janitor::spawn_janitor;
pub use rest::{
    get_discussion_handler, health_handler, post_discussion_message_handler, track_report_handler,
};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the API routes. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<state::AppState>) -> Router {
    let body_limit = app_state.upload_policy.max_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_handler))
        .route("/chat/sessions", post(start_session_handler))
        .route("/chat/sessions/{session_id}", delete(end_session_handler))
        .route(
            "/chat/sessions/{session_id}/messages",
            post(post_message_handler),
        )
        .route(
            "/chat/sessions/{session_id}/attachments",
            post(post_attachment_handler),
        )
        .route("/chat/sessions/{session_id}/history", get(history_handler))
        .route("/reports/track/{tracking_code}", get(track_report_handler))
        .route("/discussions/{discussion_code}", get(get_discussion_handler))
        .route(
            "/discussions/{discussion_code}/messages",
            post(post_discussion_message_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}
