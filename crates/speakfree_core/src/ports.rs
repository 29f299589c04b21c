//! crates/speakfree_core/src/ports.rs
//!
//! Defines the service contracts (traits) the intake core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the file system and the process-local session map.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Attachment, CreatedReport, DiscussionMessage, DiscussionSender, DiscussionThread, NewReport,
    ReportStatusView, School, SessionRecord, StoredFile, TranscriptEntry, TranscriptSender,
};
use crate::intake::IntakeSession;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    /// Looks a school up by code, ignoring case. Non-active schools resolve too.
    async fn resolve(&self, code: &str) -> PortResult<Option<School>>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    // --- Finalization ---

    /// Creates the report row and allocates globally unique tracking and discussion codes.
    async fn create_report(&self, report: NewReport) -> PortResult<CreatedReport>;

    async fn attach_file(&self, report_id: Uuid, attachment: &Attachment) -> PortResult<()>;

    /// Opens the discussion channel. Calling it again with the same code is a no-op.
    async fn open_discussion(&self, report_id: Uuid, discussion_code: &str) -> PortResult<()>;

    /// Removes a report together with its files and discussion. Used to undo a failed finalize.
    async fn discard_report(&self, report_id: Uuid) -> PortResult<()>;

    // --- Follow-up ---
    async fn find_by_tracking_code(&self, tracking_code: &str) -> PortResult<ReportStatusView>;

    async fn get_discussion(&self, discussion_code: &str) -> PortResult<DiscussionThread>;

    async fn post_discussion_message(
        &self,
        discussion_code: &str,
        sender: DiscussionSender,
        content: &str,
    ) -> PortResult<DiscussionMessage>;
}

#[async_trait]
pub trait SessionLedger: Send + Sync {
    // --- Durable session record ---
    async fn create_record(&self, session_id: &str) -> PortResult<SessionRecord>;

    async fn get_record(&self, session_id: &str) -> PortResult<Option<SessionRecord>>;

    async fn link_school(&self, session_id: &str, school_code: &str) -> PortResult<()>;

    async fn mark_completed(&self, session_id: &str, report_id: Uuid) -> PortResult<()>;

    async fn mark_ended(&self, session_id: &str) -> PortResult<()>;

    // --- Transcript ---
    async fn append_transcript(
        &self,
        session_id: &str,
        sender: TranscriptSender,
        text: &str,
        file_ref: Option<&str>,
    ) -> PortResult<()>;

    async fn transcript(&self, session_id: &str) -> PortResult<Vec<TranscriptEntry>>;
}

/// The volatile, process-lifetime half of an intake session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> PortResult<Option<IntakeSession>>;

    async fn save(&self, session: IntakeSession) -> PortResult<()>;

    /// Drops the volatile state and hands it back. `None` when nothing was stored.
    async fn expire(&self, session_id: &str) -> PortResult<Option<IntakeSession>>;

    /// Drops sessions idle past `idle_ttl` or completed longer than `completed_ttl` ago,
    /// returning the sessions that were removed.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        idle_ttl: chrono::Duration,
        completed_ttl: chrono::Duration,
    ) -> PortResult<Vec<IntakeSession>>;
}

#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    /// Writes an uploaded file and returns where it went.
    async fn store(&self, original_name: &str, data: &[u8]) -> PortResult<StoredFile>;

    /// Removes a stored file. A missing file is not an error.
    async fn remove(&self, storage_ref: &str) -> PortResult<()>;
}
