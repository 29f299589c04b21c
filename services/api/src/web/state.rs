//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use speakfree_core::ports::{AttachmentStorage, ReportRepository};
use speakfree_core::uploads::UploadPolicy;
use speakfree_core::IntakeEngine;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IntakeEngine>,
    /// Used directly by the follow-up endpoints (tracking lookup, discussions).
    pub reports: Arc<dyn ReportRepository>,
    pub storage: Arc<dyn AttachmentStorage>,
    pub upload_policy: UploadPolicy,
    pub config: Arc<Config>,
}
