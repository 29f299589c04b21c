//! crates/speakfree_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Schools
//=========================================================================================

/// Onboarding status of a school tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchoolStatus {
    Active,
    Pending,
    Inactive,
}

impl SchoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchoolStatus::Active => "active",
            SchoolStatus::Pending => "pending",
            SchoolStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(SchoolStatus::Active),
            "pending" => Some(SchoolStatus::Pending),
            "inactive" => Some(SchoolStatus::Inactive),
            _ => None,
        }
    }
}

/// A school registered on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct School {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub status: SchoolStatus,
}

impl School {
    /// Only active schools may receive new reports through the intake flow.
    pub fn accepts_reports(&self) -> bool {
        self.status == SchoolStatus::Active
    }
}

//=========================================================================================
// Classification
//=========================================================================================

/// The closed incident taxonomy used to tag reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentCategory {
    Harassment,
    PhysicalViolence,
    CyberHarassment,
    Discrimination,
    Theft,
    Substance,
    Threats,
    Other,
}

impl IncidentCategory {
    pub const ALL: [IncidentCategory; 8] = [
        IncidentCategory::Harassment,
        IncidentCategory::PhysicalViolence,
        IncidentCategory::CyberHarassment,
        IncidentCategory::Discrimination,
        IncidentCategory::Theft,
        IncidentCategory::Substance,
        IncidentCategory::Threats,
        IncidentCategory::Other,
    ];

    /// The stable identifier stored alongside reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentCategory::Harassment => "harassment",
            IncidentCategory::PhysicalViolence => "physical-violence",
            IncidentCategory::CyberHarassment => "cyber-harassment",
            IncidentCategory::Discrimination => "discrimination",
            IncidentCategory::Theft => "theft",
            IncidentCategory::Substance => "substance",
            IncidentCategory::Threats => "threats",
            IncidentCategory::Other => "other",
        }
    }

    /// The label shown back to the reporter.
    pub fn label(&self) -> &'static str {
        match self {
            IncidentCategory::Harassment => "Harassment",
            IncidentCategory::PhysicalViolence => "Physical violence",
            IncidentCategory::CyberHarassment => "Cyber-harassment",
            IncidentCategory::Discrimination => "Discrimination",
            IncidentCategory::Theft => "Theft / extortion",
            IncidentCategory::Substance => "Drugs / alcohol",
            IncidentCategory::Threats => "Threats / intimidation",
            IncidentCategory::Other => "Other situation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// Advisory metadata extracted from a narrative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: IncidentCategory,
    pub date_hint: Option<String>,
    pub location_hint: Option<String>,
}

//=========================================================================================
// Attachments
//=========================================================================================

/// A file uploaded during intake, already written to attachment storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub storage_ref: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Where attachment storage put an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub storage_ref: String,
    pub size_bytes: u64,
}

//=========================================================================================
// Reports and Discussions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pending,
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in-progress",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportStatus::Pending),
            "in-progress" | "in_progress" => Some(ReportStatus::InProgress),
            "resolved" => Some(ReportStatus::Resolved),
            _ => None,
        }
    }
}

/// Everything the repository needs to create a report row.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub school_id: Uuid,
    pub category: IncidentCategory,
    pub narrative: String,
    pub date_hint: Option<String>,
    pub location_hint: Option<String>,
    pub chat_session_id: String,
}

/// The identifiers handed back once a report row exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedReport {
    pub report_id: Uuid,
    pub tracking_code: String,
    pub discussion_code: String,
}

/// What a reporter sees when looking a report up by tracking code.
#[derive(Debug, Clone)]
pub struct ReportStatusView {
    pub tracking_code: String,
    pub category: IncidentCategory,
    pub status: ReportStatus,
    pub school_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscussionStatus {
    Open,
    Closed,
}

impl DiscussionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscussionStatus::Open => "open",
            DiscussionStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(DiscussionStatus::Open),
            "closed" => Some(DiscussionStatus::Closed),
            _ => None,
        }
    }
}

/// Who wrote a discussion message. The student side is always anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscussionSender {
    Student,
    School,
}

impl DiscussionSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscussionSender::Student => "student",
            DiscussionSender::School => "school",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(DiscussionSender::Student),
            "school" | "admin" => Some(DiscussionSender::School),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscussionMessage {
    pub sender: DiscussionSender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A discussion channel together with the report it follows up on.
#[derive(Debug, Clone)]
pub struct DiscussionThread {
    pub discussion_code: String,
    pub tracking_code: String,
    pub category: IncidentCategory,
    pub report_status: ReportStatus,
    pub school_name: String,
    pub status: DiscussionStatus,
    pub messages: Vec<DiscussionMessage>,
}

//=========================================================================================
// Durable session records and transcripts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

/// The durable half of an intake session. Survives restarts.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub school_code: Option<String>,
    pub report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSender {
    User,
    Assistant,
}

impl TranscriptSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSender::User => "user",
            TranscriptSender::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(TranscriptSender::User),
            "assistant" => Some(TranscriptSender::Assistant),
            _ => None,
        }
    }
}

/// One turn of the intake conversation.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub sender: TranscriptSender,
    pub text: String,
    pub file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}
