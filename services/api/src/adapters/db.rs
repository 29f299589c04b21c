//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of the
//! `SchoolDirectory`, `ReportRepository` and `SessionLedger` ports from the `core`
//! crate. It handles all interactions with the database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use speakfree_core::codes;
use speakfree_core::domain::{
    Attachment, CreatedReport, DiscussionMessage, DiscussionSender, DiscussionStatus,
    DiscussionThread, IncidentCategory, NewReport, ReportStatus, ReportStatusView, School,
    SchoolStatus, SessionRecord, SessionStatus, TranscriptEntry, TranscriptSender,
};
use speakfree_core::ports::{
    PortError, PortResult, ReportRepository, SchoolDirectory, SessionLedger,
};
use sqlx::postgres::PgQueryResult;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

/// How many fresh code pairs `create_report` tries before giving up.
const CODE_ATTEMPTS: usize = 5;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn corrupt(column: &str, value: &str) -> PortError {
    PortError::Unexpected(format!("Unexpected {} value in database: '{}'", column, value))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SchoolRecord {
    id: Uuid,
    code: String,
    name: String,
    status: String,
}
impl SchoolRecord {
    fn to_domain(self) -> PortResult<School> {
        let status =
            SchoolStatus::parse(&self.status).ok_or_else(|| corrupt("school status", &self.status))?;
        Ok(School {
            id: self.id,
            code: self.code,
            name: self.name,
            status,
        })
    }
}

#[derive(FromRow)]
struct ReportStatusRecord {
    tracking_code: String,
    category: String,
    status: String,
    school_name: String,
    created_at: DateTime<Utc>,
}
impl ReportStatusRecord {
    fn to_domain(self) -> PortResult<ReportStatusView> {
        Ok(ReportStatusView {
            category: IncidentCategory::parse(&self.category)
                .ok_or_else(|| corrupt("category", &self.category))?,
            status: ReportStatus::parse(&self.status)
                .ok_or_else(|| corrupt("report status", &self.status))?,
            tracking_code: self.tracking_code,
            school_name: self.school_name,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct DiscussionRecord {
    id: Uuid,
    discussion_code: String,
    status: String,
    tracking_code: String,
    category: String,
    report_status: String,
    school_name: String,
}

#[derive(FromRow)]
struct DiscussionMessageRecord {
    sender: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl DiscussionMessageRecord {
    fn to_domain(self) -> PortResult<DiscussionMessage> {
        Ok(DiscussionMessage {
            sender: DiscussionSender::parse(&self.sender)
                .ok_or_else(|| corrupt("discussion sender", &self.sender))?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ChatSessionRecord {
    session_id: String,
    status: String,
    school_code: Option<String>,
    report_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatSessionRecord {
    fn to_domain(self) -> PortResult<SessionRecord> {
        Ok(SessionRecord {
            status: SessionStatus::parse(&self.status)
                .ok_or_else(|| corrupt("session status", &self.status))?,
            session_id: self.session_id,
            school_code: self.school_code,
            report_id: self.report_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    sender: String,
    content: String,
    file_ref: Option<String>,
    created_at: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> PortResult<TranscriptEntry> {
        Ok(TranscriptEntry {
            sender: TranscriptSender::parse(&self.sender)
                .ok_or_else(|| corrupt("transcript sender", &self.sender))?,
            text: self.content,
            file_ref: self.file_ref,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `SchoolDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl SchoolDirectory for DbAdapter {
    async fn resolve(&self, code: &str) -> PortResult<Option<School>> {
        let record = sqlx::query_as::<_, SchoolRecord>(
            "SELECT id, code, name, status FROM schools WHERE code = $1",
        )
        .bind(codes::canonical(code))
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(SchoolRecord::to_domain).transpose()
    }
}

//=========================================================================================
// `ReportRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportRepository for DbAdapter {
    async fn create_report(&self, report: NewReport) -> PortResult<CreatedReport> {
        for attempt in 1..=CODE_ATTEMPTS {
            let report_id = Uuid::new_v4();
            let tracking_code = codes::tracking_code();
            let discussion_code = codes::discussion_code();

            let result = sqlx::query(
                "INSERT INTO reports (id, tracking_code, discussion_code, school_id, category, narrative, date_hint, location_hint, status, chat_session_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(report_id)
            .bind(&tracking_code)
            .bind(&discussion_code)
            .bind(report.school_id)
            .bind(report.category.as_str())
            .bind(&report.narrative)
            .bind(&report.date_hint)
            .bind(&report.location_hint)
            .bind(ReportStatus::Pending.as_str())
            .bind(&report.chat_session_id)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    return Ok(CreatedReport {
                        report_id,
                        tracking_code,
                        discussion_code,
                    })
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "Report code collision, regenerating");
                }
                Err(e) => return Err(unexpected(e)),
            }
        }

        Err(PortError::Conflict(format!(
            "Could not allocate unique report codes after {} attempts",
            CODE_ATTEMPTS
        )))
    }

    async fn attach_file(&self, report_id: Uuid, attachment: &Attachment) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO report_files (report_id, storage_ref, original_name, mime_type, size_bytes) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(report_id)
        .bind(&attachment.storage_ref)
        .bind(&attachment.original_name)
        .bind(&attachment.mime_type)
        .bind(attachment.size_bytes as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                PortError::NotFound(format!("Report {} not found", report_id))
            }
            _ => unexpected(e),
        })?;
        Ok(())
    }

    async fn open_discussion(&self, report_id: Uuid, discussion_code: &str) -> PortResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO discussions (id, report_id, discussion_code, status) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (report_id, discussion_code) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(report_id)
        .bind(discussion_code)
        .bind(DiscussionStatus::Open.as_str())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(PortError::Conflict(format!(
                "Discussion code {} belongs to another report",
                discussion_code
            ))),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => Err(
                PortError::NotFound(format!("Report {} not found", report_id)),
            ),
            Err(e) => Err(unexpected(e)),
        }
    }

    async fn discard_report(&self, report_id: Uuid) -> PortResult<()> {
        // Files, discussions and their messages cascade.
        sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(report_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn find_by_tracking_code(&self, tracking_code: &str) -> PortResult<ReportStatusView> {
        let wanted = codes::canonical(tracking_code);
        let record = sqlx::query_as::<_, ReportStatusRecord>(
            "SELECT r.tracking_code, r.category, r.status, s.name AS school_name, r.created_at \
             FROM reports r JOIN schools s ON s.id = r.school_id \
             WHERE r.tracking_code = $1",
        )
        .bind(&wanted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Report {} not found", wanted)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn get_discussion(&self, discussion_code: &str) -> PortResult<DiscussionThread> {
        let wanted = codes::canonical(discussion_code);
        let record = sqlx::query_as::<_, DiscussionRecord>(
            "SELECT d.id, d.discussion_code, d.status, r.tracking_code, r.category, \
                    r.status AS report_status, s.name AS school_name \
             FROM discussions d \
             JOIN reports r ON r.id = d.report_id \
             JOIN schools s ON s.id = r.school_id \
             WHERE d.discussion_code = $1",
        )
        .bind(&wanted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Discussion {} not found", wanted))
            }
            _ => unexpected(e),
        })?;

        let messages = sqlx::query_as::<_, DiscussionMessageRecord>(
            "SELECT sender, content, created_at FROM discussion_messages WHERE discussion_id = $1 ORDER BY id ASC",
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(DiscussionMessageRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;

        Ok(DiscussionThread {
            status: DiscussionStatus::parse(&record.status)
                .ok_or_else(|| corrupt("discussion status", &record.status))?,
            category: IncidentCategory::parse(&record.category)
                .ok_or_else(|| corrupt("category", &record.category))?,
            report_status: ReportStatus::parse(&record.report_status)
                .ok_or_else(|| corrupt("report status", &record.report_status))?,
            discussion_code: record.discussion_code,
            tracking_code: record.tracking_code,
            school_name: record.school_name,
            messages,
        })
    }

    async fn post_discussion_message(
        &self,
        discussion_code: &str,
        sender: DiscussionSender,
        content: &str,
    ) -> PortResult<DiscussionMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PortError::Invalid("message content is empty".to_string()));
        }
        let wanted = codes::canonical(discussion_code);

        let (discussion_id, status): (Uuid, String) = sqlx::query_as(
            "SELECT id, status FROM discussions WHERE discussion_code = $1",
        )
        .bind(&wanted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Discussion {} not found", wanted))
            }
            _ => unexpected(e),
        })?;
        if DiscussionStatus::parse(&status) == Some(DiscussionStatus::Closed) {
            return Err(PortError::Conflict(format!("Discussion {} is closed", wanted)));
        }

        let record = sqlx::query_as::<_, DiscussionMessageRecord>(
            "INSERT INTO discussion_messages (discussion_id, sender, content) VALUES ($1, $2, $3) \
             RETURNING sender, content, created_at",
        )
        .bind(discussion_id)
        .bind(sender.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }
}

//=========================================================================================
// `SessionLedger` Trait Implementation
//=========================================================================================

/// Maps "no row touched" by a chat session UPDATE to `NotFound`.
fn require_session_row(result: PgQueryResult, session_id: &str) -> PortResult<()> {
    if result.rows_affected() == 0 {
        return Err(PortError::NotFound(format!("Session {} not found", session_id)));
    }
    Ok(())
}

#[async_trait]
impl SessionLedger for DbAdapter {
    async fn create_record(&self, session_id: &str) -> PortResult<SessionRecord> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            "INSERT INTO chat_sessions (session_id, status) VALUES ($1, $2) \
             RETURNING session_id, status, school_code, report_id, created_at, updated_at",
        )
        .bind(session_id)
        .bind(SessionStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("Session {} already exists", session_id))
            } else {
                unexpected(e)
            }
        })?;
        record.to_domain()
    }

    async fn get_record(&self, session_id: &str) -> PortResult<Option<SessionRecord>> {
        sqlx::query_as::<_, ChatSessionRecord>(
            "SELECT session_id, status, school_code, report_id, created_at, updated_at \
             FROM chat_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(ChatSessionRecord::to_domain)
        .transpose()
    }

    async fn link_school(&self, session_id: &str, school_code: &str) -> PortResult<()> {
        let query = sqlx::query(
            "UPDATE chat_sessions SET school_code = $2, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(school_code);
        let result = query.execute(&self.pool).await.map_err(unexpected)?;
        require_session_row(result, session_id)
    }

    async fn mark_completed(&self, session_id: &str, report_id: Uuid) -> PortResult<()> {
        let query = sqlx::query(
            "UPDATE chat_sessions SET status = $2, report_id = $3, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(SessionStatus::Completed.as_str())
        .bind(report_id);
        let result = query.execute(&self.pool).await.map_err(unexpected)?;
        require_session_row(result, session_id)
    }

    async fn mark_ended(&self, session_id: &str) -> PortResult<()> {
        let query = sqlx::query(
            "UPDATE chat_sessions SET status = $2, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(SessionStatus::Ended.as_str());
        let result = query.execute(&self.pool).await.map_err(unexpected)?;
        require_session_row(result, session_id)
    }

    async fn append_transcript(
        &self,
        session_id: &str,
        sender: TranscriptSender,
        text: &str,
        file_ref: Option<&str>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (session_id, sender, content, file_ref) VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(sender.as_str())
        .bind(text)
        .bind(file_ref)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn transcript(&self, session_id: &str) -> PortResult<Vec<TranscriptEntry>> {
        sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT sender, content, file_ref, created_at FROM chat_messages WHERE session_id = $1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(ChatMessageRecord::to_domain)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stored_values_surface_as_unexpected() {
        let record = ChatSessionRecord {
            session_id: "CHAT-1".to_string(),
            status: "archived".to_string(),
            school_code: None,
            report_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(record.to_domain(), Err(PortError::Unexpected(_))));
    }

    #[test]
    fn report_status_record_maps_to_domain() {
        let view = ReportStatusRecord {
            tracking_code: "RPT-ABC123XYZ".to_string(),
            category: "harassment".to_string(),
            status: "in-progress".to_string(),
            school_name: "Collège Victor Hugo".to_string(),
            created_at: Utc::now(),
        }
        .to_domain()
        .unwrap();
        assert_eq!(view.category, IncidentCategory::Harassment);
        assert_eq!(view.status, ReportStatus::InProgress);
    }
}
