//! crates/speakfree_core/src/memory.rs
//!
//! In-memory implementations of the collaborator ports. They back the `memory`
//! storage mode of the service and double as fakes in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::codes;
use crate::domain::{
    Attachment, CreatedReport, DiscussionMessage, DiscussionSender, DiscussionStatus,
    DiscussionThread, IncidentCategory, NewReport, ReportStatus, ReportStatusView, School,
    SessionRecord, SessionStatus, StoredFile, TranscriptEntry, TranscriptSender,
};
use crate::ports::{
    AttachmentStorage, PortError, PortResult, ReportRepository, SchoolDirectory, SessionLedger,
};

//=========================================================================================
// School Directory
//=========================================================================================

#[derive(Default)]
pub struct InMemorySchoolDirectory {
    // Keyed by upper-cased code.
    schools: RwLock<HashMap<String, School>>,
}

impl InMemorySchoolDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schools(schools: impl IntoIterator<Item = School>) -> Self {
        let schools = schools
            .into_iter()
            .map(|s| (codes::canonical(&s.code), s))
            .collect();
        Self {
            schools: RwLock::new(schools),
        }
    }

    pub async fn insert(&self, school: School) {
        self.schools
            .write()
            .await
            .insert(codes::canonical(&school.code), school);
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<School> {
        self.schools
            .read()
            .await
            .values()
            .find(|s| s.id == id)
            .cloned()
    }
}

#[async_trait]
impl SchoolDirectory for InMemorySchoolDirectory {
    async fn resolve(&self, code: &str) -> PortResult<Option<School>> {
        Ok(self.schools.read().await.get(&codes::canonical(code)).cloned())
    }
}

//=========================================================================================
// Report Repository
//=========================================================================================

/// A report as held by the in-memory repository.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub id: Uuid,
    pub tracking_code: String,
    pub discussion_code: String,
    pub school_id: Uuid,
    pub category: IncidentCategory,
    pub narrative: String,
    pub date_hint: Option<String>,
    pub location_hint: Option<String>,
    pub status: ReportStatus,
    pub chat_session_id: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredDiscussion {
    report_id: Uuid,
    status: DiscussionStatus,
    messages: Vec<DiscussionMessage>,
}

#[derive(Default)]
struct ReportTables {
    reports: HashMap<Uuid, StoredReport>,
    // Discussions keyed by code.
    discussions: HashMap<String, StoredDiscussion>,
}

pub struct InMemoryReportRepository {
    directory: Arc<InMemorySchoolDirectory>,
    tables: RwLock<ReportTables>,
}

impl InMemoryReportRepository {
    pub fn new(directory: Arc<InMemorySchoolDirectory>) -> Self {
        Self {
            directory,
            tables: RwLock::new(ReportTables::default()),
        }
    }

    pub async fn report_count(&self) -> usize {
        self.tables.read().await.reports.len()
    }

    pub async fn report(&self, report_id: Uuid) -> Option<StoredReport> {
        self.tables.read().await.reports.get(&report_id).cloned()
    }

    pub async fn reports(&self) -> Vec<StoredReport> {
        self.tables.read().await.reports.values().cloned().collect()
    }

    pub async fn discussion_count(&self) -> usize {
        self.tables.read().await.discussions.len()
    }

    /// Moves a report through its lifecycle, as the school dashboard would.
    pub async fn set_status(&self, report_id: Uuid, status: ReportStatus) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let report = tables
            .reports
            .get_mut(&report_id)
            .ok_or_else(|| PortError::NotFound(format!("Report {} not found", report_id)))?;
        report.status = status;
        Ok(())
    }

    async fn school_name(&self, school_id: Uuid) -> String {
        self.directory
            .find_by_id(school_id)
            .await
            .map(|s| s.name)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn create_report(&self, report: NewReport) -> PortResult<CreatedReport> {
        let mut tables = self.tables.write().await;

        let (tracking_code, discussion_code) = loop {
            let tracking = codes::tracking_code();
            let discussion = codes::discussion_code();
            let taken = tables
                .reports
                .values()
                .any(|r| r.tracking_code == tracking || r.discussion_code == discussion);
            if !taken {
                break (tracking, discussion);
            }
        };

        let id = Uuid::new_v4();
        tables.reports.insert(
            id,
            StoredReport {
                id,
                tracking_code: tracking_code.clone(),
                discussion_code: discussion_code.clone(),
                school_id: report.school_id,
                category: report.category,
                narrative: report.narrative,
                date_hint: report.date_hint,
                location_hint: report.location_hint,
                status: ReportStatus::Pending,
                chat_session_id: report.chat_session_id,
                attachments: Vec::new(),
                created_at: Utc::now(),
            },
        );

        Ok(CreatedReport {
            report_id: id,
            tracking_code,
            discussion_code,
        })
    }

    async fn attach_file(&self, report_id: Uuid, attachment: &Attachment) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let report = tables
            .reports
            .get_mut(&report_id)
            .ok_or_else(|| PortError::NotFound(format!("Report {} not found", report_id)))?;
        report.attachments.push(attachment.clone());
        Ok(())
    }

    async fn open_discussion(&self, report_id: Uuid, discussion_code: &str) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.reports.contains_key(&report_id) {
            return Err(PortError::NotFound(format!("Report {} not found", report_id)));
        }
        match tables.discussions.get(discussion_code) {
            Some(existing) if existing.report_id == report_id => Ok(()),
            Some(_) => Err(PortError::Conflict(format!(
                "Discussion code {} belongs to another report",
                discussion_code
            ))),
            None => {
                tables.discussions.insert(
                    discussion_code.to_string(),
                    StoredDiscussion {
                        report_id,
                        status: DiscussionStatus::Open,
                        messages: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn discard_report(&self, report_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables.reports.remove(&report_id);
        tables.discussions.retain(|_, d| d.report_id != report_id);
        Ok(())
    }

    async fn find_by_tracking_code(&self, tracking_code: &str) -> PortResult<ReportStatusView> {
        let wanted = codes::canonical(tracking_code);
        let report = self
            .tables
            .read()
            .await
            .reports
            .values()
            .find(|r| r.tracking_code == wanted)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Report {} not found", wanted)))?;

        Ok(ReportStatusView {
            tracking_code: report.tracking_code,
            category: report.category,
            status: report.status,
            school_name: self.school_name(report.school_id).await,
            created_at: report.created_at,
        })
    }

    async fn get_discussion(&self, discussion_code: &str) -> PortResult<DiscussionThread> {
        let wanted = codes::canonical(discussion_code);
        let (report, discussion) = {
            let tables = self.tables.read().await;
            let discussion = tables
                .discussions
                .get(&wanted)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Discussion {} not found", wanted)))?;
            let report = tables
                .reports
                .get(&discussion.report_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Discussion {} not found", wanted)))?;
            (report, discussion)
        };

        Ok(DiscussionThread {
            discussion_code: wanted,
            tracking_code: report.tracking_code,
            category: report.category,
            report_status: report.status,
            school_name: self.school_name(report.school_id).await,
            status: discussion.status,
            messages: discussion.messages,
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
        let mut tables = self.tables.write().await;
        let discussion = tables
            .discussions
            .get_mut(&wanted)
            .ok_or_else(|| PortError::NotFound(format!("Discussion {} not found", wanted)))?;
        if discussion.status == DiscussionStatus::Closed {
            return Err(PortError::Conflict(format!("Discussion {} is closed", wanted)));
        }

        let message = DiscussionMessage {
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        discussion.messages.push(message.clone());
        Ok(message)
    }
}

//=========================================================================================
// Session Ledger
//=========================================================================================

#[derive(Default)]
pub struct InMemorySessionLedger {
    records: RwLock<HashMap<String, SessionRecord>>,
    transcripts: RwLock<HashMap<String, Vec<TranscriptEntry>>>,
}

impl InMemorySessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, session_id: &str, apply: F) -> PortResult<()>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        apply(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for InMemorySessionLedger {
    async fn create_record(&self, session_id: &str) -> PortResult<SessionRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(session_id) {
            return Err(PortError::Conflict(format!(
                "Session {} already exists",
                session_id
            )));
        }
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.to_string(),
            status: SessionStatus::Active,
            school_code: None,
            report_id: None,
            created_at: now,
            updated_at: now,
        };
        records.insert(session_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_record(&self, session_id: &str) -> PortResult<Option<SessionRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn link_school(&self, session_id: &str, school_code: &str) -> PortResult<()> {
        let code = school_code.to_string();
        self.update(session_id, move |r| r.school_code = Some(code))
            .await
    }

    async fn mark_completed(&self, session_id: &str, report_id: Uuid) -> PortResult<()> {
        self.update(session_id, move |r| {
            r.status = SessionStatus::Completed;
            r.report_id = Some(report_id);
        })
        .await
    }

    async fn mark_ended(&self, session_id: &str) -> PortResult<()> {
        self.update(session_id, |r| r.status = SessionStatus::Ended)
            .await
    }

    async fn append_transcript(
        &self,
        session_id: &str,
        sender: TranscriptSender,
        text: &str,
        file_ref: Option<&str>,
    ) -> PortResult<()> {
        self.transcripts
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(TranscriptEntry {
                sender,
                text: text.to_string(),
                file_ref: file_ref.map(str::to_string),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn transcript(&self, session_id: &str) -> PortResult<Vec<TranscriptEntry>> {
        Ok(self
            .transcripts
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

//=========================================================================================
// Attachment Storage
//=========================================================================================

/// Holds uploaded bytes in a map keyed by storage ref.
#[derive(Default)]
pub struct InMemoryAttachmentStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryAttachmentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, storage_ref: &str) -> bool {
        self.files.read().await.contains_key(storage_ref)
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

#[async_trait]
impl AttachmentStorage for InMemoryAttachmentStorage {
    async fn store(&self, original_name: &str, data: &[u8]) -> PortResult<StoredFile> {
        let storage_ref = format!("{}-{}", Uuid::new_v4().simple(), original_name);
        self.files
            .write()
            .await
            .insert(storage_ref.clone(), data.to_vec());
        Ok(StoredFile {
            storage_ref,
            size_bytes: data.len() as u64,
        })
    }

    async fn remove(&self, storage_ref: &str) -> PortResult<()> {
        self.files.write().await.remove(storage_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SchoolStatus;

    fn school(code: &str, status: SchoolStatus) -> School {
        School {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: format!("College {code}"),
            status,
        }
    }

    fn new_report(school_id: Uuid) -> NewReport {
        NewReport {
            school_id,
            category: IncidentCategory::Theft,
            narrative: "my bag was stolen".to_string(),
            date_hint: None,
            location_hint: None,
            chat_session_id: "CHAT-X".to_string(),
        }
    }

    #[tokio::test]
    async fn directory_lookup_ignores_case() {
        let directory = InMemorySchoolDirectory::from_schools([
            school("ECOLE-AB1234", SchoolStatus::Active),
            school("ECOLE-PEND01", SchoolStatus::Pending),
        ]);
        let found = directory.resolve("ecole-ab1234").await.unwrap().unwrap();
        assert_eq!(found.code, "ECOLE-AB1234");

        let pending = directory.resolve("ECOLE-PEND01").await.unwrap().unwrap();
        assert!(!pending.accepts_reports());

        assert!(directory.resolve("ECOLE-NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discussion_opening_is_idempotent() {
        let directory = Arc::new(InMemorySchoolDirectory::new());
        let s = school("ECOLE-AB1234", SchoolStatus::Active);
        directory.insert(s.clone()).await;
        let repo = InMemoryReportRepository::new(directory);

        let created = repo.create_report(new_report(s.id)).await.unwrap();
        repo.open_discussion(created.report_id, &created.discussion_code)
            .await
            .unwrap();
        repo.open_discussion(created.report_id, &created.discussion_code)
            .await
            .unwrap();
        assert_eq!(repo.discussion_count().await, 1);

        let other = repo.create_report(new_report(s.id)).await.unwrap();
        let err = repo
            .open_discussion(other.report_id, &created.discussion_code)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn follow_up_through_codes() {
        let directory = Arc::new(InMemorySchoolDirectory::new());
        let s = school("ECOLE-AB1234", SchoolStatus::Active);
        directory.insert(s.clone()).await;
        let repo = InMemoryReportRepository::new(directory);

        let created = repo.create_report(new_report(s.id)).await.unwrap();
        repo.open_discussion(created.report_id, &created.discussion_code)
            .await
            .unwrap();

        let view = repo
            .find_by_tracking_code(&created.tracking_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(view.status, ReportStatus::Pending);
        assert_eq!(view.school_name, "College ECOLE-AB1234");

        repo.set_status(created.report_id, ReportStatus::InProgress)
            .await
            .unwrap();
        repo.post_discussion_message(&created.discussion_code, DiscussionSender::Student, "hello")
            .await
            .unwrap();
        repo.post_discussion_message(&created.discussion_code, DiscussionSender::School, "we hear you")
            .await
            .unwrap();
        let err = repo
            .post_discussion_message(&created.discussion_code, DiscussionSender::Student, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Invalid(_)));

        let thread = repo.get_discussion(&created.discussion_code).await.unwrap();
        assert_eq!(thread.report_status, ReportStatus::InProgress);
        assert_eq!(thread.tracking_code, created.tracking_code);
        let senders: Vec<_> = thread.messages.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![DiscussionSender::Student, DiscussionSender::School]);
    }

    #[tokio::test]
    async fn discard_removes_report_and_discussion() {
        let directory = Arc::new(InMemorySchoolDirectory::new());
        let repo = InMemoryReportRepository::new(directory);
        let created = repo.create_report(new_report(Uuid::new_v4())).await.unwrap();
        repo.open_discussion(created.report_id, &created.discussion_code)
            .await
            .unwrap();

        repo.discard_report(created.report_id).await.unwrap();
        assert_eq!(repo.report_count().await, 0);
        assert_eq!(repo.discussion_count().await, 0);
        assert!(matches!(
            repo.find_by_tracking_code(&created.tracking_code).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ledger_tracks_status_changes() {
        let ledger = InMemorySessionLedger::new();
        ledger.create_record("CHAT-1").await.unwrap();
        assert!(matches!(
            ledger.create_record("CHAT-1").await,
            Err(PortError::Conflict(_))
        ));

        ledger.link_school("CHAT-1", "ECOLE-AB1234").await.unwrap();
        let report_id = Uuid::new_v4();
        ledger.mark_completed("CHAT-1", report_id).await.unwrap();

        let record = ledger.get_record("CHAT-1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.school_code.as_deref(), Some("ECOLE-AB1234"));
        assert_eq!(record.report_id, Some(report_id));

        assert!(matches!(
            ledger.mark_ended("CHAT-404").await,
            Err(PortError::NotFound(_))
        ));
    }
}
