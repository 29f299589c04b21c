//! Conversation-level tests for the intake engine, run against the in-memory adapters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    Attachment, CreatedReport, DiscussionMessage, DiscussionSender, DiscussionThread,
    IncidentCategory, NewReport, ReportStatusView, School, SchoolStatus, SessionRecord,
    SessionStatus, TranscriptEntry, TranscriptSender,
};
use crate::memory::{
    InMemoryAttachmentStorage, InMemoryReportRepository, InMemorySchoolDirectory,
    InMemorySessionLedger,
};
use crate::ports::{
    AttachmentStorage, PortError, PortResult, ReportRepository, SchoolDirectory, SessionLedger,
    SessionStore,
};
use crate::session_store::InMemorySessionStore;

use super::{IntakeEngine, IntakeError, IntakeSettings, IntakeStep};

//=========================================================================================
// Fakes
//=========================================================================================

/// Wraps the in-memory repository with call counting and switchable failures.
struct FlakyReports {
    inner: Arc<InMemoryReportRepository>,
    create_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_discussion: AtomicBool,
}

#[async_trait]
impl ReportRepository for FlakyReports {
    async fn create_report(&self, report: NewReport) -> PortResult<CreatedReport> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database is down".to_string()));
        }
        self.inner.create_report(report).await
    }

    async fn attach_file(&self, report_id: Uuid, attachment: &Attachment) -> PortResult<()> {
        self.inner.attach_file(report_id, attachment).await
    }

    async fn open_discussion(&self, report_id: Uuid, discussion_code: &str) -> PortResult<()> {
        if self.fail_discussion.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("discussion insert failed".to_string()));
        }
        self.inner.open_discussion(report_id, discussion_code).await
    }

    async fn discard_report(&self, report_id: Uuid) -> PortResult<()> {
        self.inner.discard_report(report_id).await
    }

    async fn find_by_tracking_code(&self, tracking_code: &str) -> PortResult<ReportStatusView> {
        self.inner.find_by_tracking_code(tracking_code).await
    }

    async fn get_discussion(&self, discussion_code: &str) -> PortResult<DiscussionThread> {
        self.inner.get_discussion(discussion_code).await
    }

    async fn post_discussion_message(
        &self,
        discussion_code: &str,
        sender: DiscussionSender,
        content: &str,
    ) -> PortResult<DiscussionMessage> {
        self.inner
            .post_discussion_message(discussion_code, sender, content)
            .await
    }
}

/// A directory that can be switched off.
struct SwitchableDirectory {
    inner: Arc<InMemorySchoolDirectory>,
    down: AtomicBool,
}

#[async_trait]
impl SchoolDirectory for SwitchableDirectory {
    async fn resolve(&self, code: &str) -> PortResult<Option<School>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("directory timeout".to_string()));
        }
        self.inner.resolve(code).await
    }
}

struct Harness {
    engine: IntakeEngine,
    directory: Arc<SwitchableDirectory>,
    reports: Arc<FlakyReports>,
    repo: Arc<InMemoryReportRepository>,
    ledger: Arc<InMemorySessionLedger>,
    store: Arc<InMemorySessionStore>,
    storage: Arc<InMemoryAttachmentStorage>,
}

const ACTIVE_CODE: &str = "ECOLE-AB1234";
const PENDING_CODE: &str = "ECOLE-PEND01";

fn harness() -> Harness {
    let schools = InMemorySchoolDirectory::from_schools([
        School {
            id: Uuid::new_v4(),
            code: ACTIVE_CODE.to_string(),
            name: "Collège Victor Hugo".to_string(),
            status: SchoolStatus::Active,
        },
        School {
            id: Uuid::new_v4(),
            code: PENDING_CODE.to_string(),
            name: "Lycée en attente".to_string(),
            status: SchoolStatus::Pending,
        },
    ]);
    let schools = Arc::new(schools);
    let directory = Arc::new(SwitchableDirectory {
        inner: schools.clone(),
        down: AtomicBool::new(false),
    });
    let repo = Arc::new(InMemoryReportRepository::new(schools));
    let reports = Arc::new(FlakyReports {
        inner: repo.clone(),
        create_calls: AtomicUsize::new(0),
        fail_create: AtomicBool::new(false),
        fail_discussion: AtomicBool::new(false),
    });
    let ledger = Arc::new(InMemorySessionLedger::new());
    let store = Arc::new(InMemorySessionStore::new());
    let storage = Arc::new(InMemoryAttachmentStorage::new());

    let settings = IntakeSettings {
        max_attachments: 3,
        ..IntakeSettings::default()
    };
    let engine = IntakeEngine::new(
        directory.clone(),
        reports.clone(),
        ledger.clone(),
        store.clone(),
        storage.clone(),
        settings,
    );

    Harness {
        engine,
        directory,
        reports,
        repo,
        ledger,
        store,
        storage,
    }
}

fn attachment(name: &str) -> Attachment {
    Attachment {
        storage_ref: format!("uploads/{name}"),
        original_name: name.to_string(),
        mime_type: "image/jpeg".to_string(),
        size_bytes: 2048,
    }
}

impl Harness {
    fn create_calls(&self) -> usize {
        self.reports.create_calls.load(Ordering::SeqCst)
    }

    /// Stores real bytes so cleanup can be observed.
    async fn stored_attachment(&self, name: &str) -> Attachment {
        let stored = self.storage.store(name, b"evidence").await.unwrap();
        Attachment {
            storage_ref: stored.storage_ref,
            original_name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            size_bytes: stored.size_bytes,
        }
    }

    /// Starts with the active school and walks to AWAITING_FILES with one stored upload.
    async fn session_with_upload(&self) -> (String, String) {
        let id = self
            .engine
            .start_session(Some(ACTIVE_CODE))
            .await
            .unwrap()
            .session_id;
        self.engine
            .post_message(&id, "I was pushed in the hallway yesterday")
            .await
            .unwrap();
        self.engine.post_message(&id, "yes").await.unwrap();
        let upload = self.stored_attachment("a.jpg").await;
        let storage_ref = upload.storage_ref.clone();
        let outcome = self.engine.post_attachment(&id, upload).await.unwrap();
        assert!(outcome.accepted);
        (id, storage_ref)
    }

    /// Starts with the active school and walks to CONFIRMING without evidence.
    async fn session_at_confirming(&self) -> String {
        let started = self.engine.start_session(Some(ACTIVE_CODE)).await.unwrap();
        let id = started.session_id;
        self.engine
            .post_message(&id, "I was pushed in the hallway yesterday")
            .await
            .unwrap();
        let outcome = self.engine.post_message(&id, "no").await.unwrap();
        assert_eq!(outcome.step, IntakeStep::Confirming);
        id
    }
}

//=========================================================================================
// Scenarios
//=========================================================================================

#[tokio::test]
async fn end_to_end_report() {
    let h = harness();

    let started = h.engine.start_session(Some(ACTIVE_CODE)).await.unwrap();
    assert_eq!(started.step, IntakeStep::AwaitingNarrative);
    assert!(started.reply.contains("Collège Victor Hugo"));
    let id = started.session_id;

    let outcome = h
        .engine
        .post_message(&id, "I was pushed in the hallway yesterday")
        .await
        .unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingEvidenceChoice);
    assert!(outcome.reply.contains("Physical violence"));
    assert!(outcome.reply.contains("Yesterday"));

    let session = h.engine.snapshot(&id).await.unwrap();
    let classification = session.classification.unwrap();
    assert_eq!(classification.category, IncidentCategory::PhysicalViolence);
    assert_eq!(classification.date_hint.as_deref(), Some("Yesterday"));

    let outcome = h.engine.post_message(&id, "no").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::Confirming);
    assert!(!outcome.finalized);

    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(outcome.finalized);
    assert!(matches!(outcome.step, IntakeStep::Completed(_)));
    let tracking = outcome.tracking_code.unwrap();
    let discussion = outcome.discussion_code.unwrap();
    assert!(tracking.starts_with("RPT-"));
    assert!(discussion.starts_with("DSC-"));
    assert!(outcome.reply.contains(&tracking));

    let reports = h.repo.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, IncidentCategory::PhysicalViolence);
    assert_eq!(reports[0].location_hint.as_deref(), Some("Hallway"));
    assert_eq!(reports[0].chat_session_id, id);

    let thread = h.repo.get_discussion(&discussion).await.unwrap();
    assert_eq!(thread.tracking_code, tracking);

    let record = h.ledger.get_record(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.report_id, Some(reports[0].id));
}

#[tokio::test]
async fn confirming_twice_creates_one_report() {
    let h = harness();
    let id = h.session_at_confirming().await;

    let first = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(first.finalized);

    let second = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(!second.finalized);
    assert!(second.tracking_code.is_none());
    assert!(second.reply.contains("already been sent"));

    assert_eq!(h.create_calls(), 1);
    assert_eq!(h.repo.report_count().await, 1);
}

#[tokio::test]
async fn concurrent_confirmations_finalize_once() {
    let h = harness();
    let id = h.session_at_confirming().await;

    let (a, b) = tokio::join!(
        h.engine.post_message(&id, "yes"),
        h.engine.post_message(&id, "oui")
    );
    let finalized = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| o.finalized)
        .count();

    assert_eq!(finalized, 1);
    assert_eq!(h.create_calls(), 1);
    assert_eq!(h.repo.report_count().await, 1);
}

#[tokio::test]
async fn unknown_school_is_rejected_and_never_reported() {
    let h = harness();

    let started = h
        .engine
        .start_session(Some("ECOLE-DOESNOTEXIST"))
        .await
        .unwrap();
    assert_eq!(started.step, IntakeStep::AwaitingSchool);
    assert!(started.reply.contains("couldn't find"));

    for message in ["hello", "yes", "I was hit"] {
        let outcome = h
            .engine
            .post_message(&started.session_id, message)
            .await
            .unwrap();
        assert_eq!(outcome.step, IntakeStep::AwaitingSchool);
    }
    assert_eq!(h.create_calls(), 0);
}

#[tokio::test]
async fn pending_school_is_a_retryable_rejection() {
    let h = harness();
    let started = h.engine.start_session(None).await.unwrap();
    assert_eq!(started.step, IntakeStep::AwaitingSchool);

    let outcome = h
        .engine
        .post_message(&started.session_id, PENDING_CODE)
        .await
        .unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingSchool);
    assert!(outcome.reply.contains("not accepting reports"));

    // The reporter can still give a valid code afterwards.
    let outcome = h
        .engine
        .post_message(&started.session_id, "  ecole-ab1234 ")
        .await
        .unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingNarrative);
    let record = h.ledger.get_record(&started.session_id).await.unwrap().unwrap();
    assert_eq!(record.school_code.as_deref(), Some(ACTIVE_CODE));
}

#[tokio::test]
async fn directory_outage_does_not_advance() {
    let h = harness();
    let started = h.engine.start_session(None).await.unwrap();
    h.directory.down.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .post_message(&started.session_id, ACTIVE_CODE)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.reply().is_some());

    h.directory.down.store(false, Ordering::SeqCst);
    let session = h.engine.snapshot(&started.session_id).await.unwrap();
    assert_eq!(session.step, IntakeStep::AwaitingSchool);
}

#[tokio::test]
async fn ambiguous_evidence_answer_extends_the_narrative() {
    let h = harness();
    let started = h.engine.start_session(Some(ACTIVE_CODE)).await.unwrap();
    let id = started.session_id;
    h.engine
        .post_message(&id, "Someone keeps insulting me in class")
        .await
        .unwrap();

    let outcome = h
        .engine
        .post_message(&id, "it happened again yesterday")
        .await
        .unwrap();
    assert_eq!(outcome.step, IntakeStep::Confirming);
    assert!(outcome.reply.contains("Someone keeps insulting me in class"));
    assert!(outcome.reply.contains("it happened again yesterday"));
    assert!(outcome.reply.contains("Date: Yesterday"));

    let session = h.engine.snapshot(&id).await.unwrap();
    assert_eq!(
        session.narrative,
        "Someone keeps insulting me in class\n\nit happened again yesterday"
    );
}

#[tokio::test]
async fn short_or_empty_narratives_are_reprompted() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;

    let outcome = h.engine.post_message(&id, "   ").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingNarrative);

    let outcome = h.engine.post_message(&id, "help").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingNarrative);
    assert!(outcome.reply.contains("at least 10 characters"));
}

#[tokio::test]
async fn unrecognized_confirmation_reprompts() {
    let h = harness();
    let id = h.session_at_confirming().await;

    let outcome = h.engine.post_message(&id, "hmm not sure").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::Confirming);
    assert!(outcome.reply.contains("\"yes\""));
    assert_eq!(h.create_calls(), 0);
}

#[tokio::test]
async fn restart_keeps_school_and_attachments() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;
    h.engine
        .post_message(&id, "They took my phone at the bus stop")
        .await
        .unwrap();
    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingFiles);

    h.engine
        .post_attachment(&id, attachment("a.jpg"))
        .await
        .unwrap();
    let outcome = h.engine.post_message(&id, "done").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::Confirming);

    let outcome = h.engine.post_message(&id, "no").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingNarrative);

    h.engine
        .post_message(&id, "Someone stole my phone at the bus stop this morning")
        .await
        .unwrap();
    let outcome = h.engine.post_message(&id, "no").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::Confirming);
    assert!(outcome.reply.contains("1 file(s)"));

    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(outcome.finalized);

    let reports = h.repo.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, IncidentCategory::Theft);
    assert_eq!(
        reports[0].narrative,
        "Someone stole my phone at the bus stop this morning"
    );
    let names: Vec<_> = reports[0]
        .attachments
        .iter()
        .map(|a| a.original_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.jpg"]);
}

#[tokio::test]
async fn attachments_keep_upload_order() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;
    h.engine
        .post_message(&id, "Someone posts photos of me on snapchat")
        .await
        .unwrap();
    h.engine.post_message(&id, "yes").await.unwrap();

    let first = h
        .engine
        .post_attachment(&id, attachment("a.jpg"))
        .await
        .unwrap();
    assert!(first.accepted);
    assert_eq!(first.attachment_count, 1);
    let second = h
        .engine
        .post_attachment(&id, attachment("b.jpg"))
        .await
        .unwrap();
    assert_eq!(second.attachment_count, 2);

    let outcome = h.engine.post_message(&id, "still looking").await.unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingFiles);

    h.engine.post_message(&id, "send").await.unwrap();
    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(outcome.finalized);

    let report = &h.repo.reports().await[0];
    let names: Vec<_> = report
        .attachments
        .iter()
        .map(|a| a.original_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
}

#[tokio::test]
async fn attachments_are_only_taken_while_collecting_evidence() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;

    let refused = h
        .engine
        .post_attachment(&id, attachment("early.jpg"))
        .await
        .unwrap();
    assert!(!refused.accepted);
    assert_eq!(refused.attachment_count, 0);
    assert_eq!(refused.step, IntakeStep::AwaitingNarrative);

    h.engine
        .post_message(&id, "Someone pushed me down the stairs")
        .await
        .unwrap();

    // Uploading while asked about evidence counts as a yes.
    let accepted = h
        .engine
        .post_attachment(&id, attachment("bruise.jpg"))
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert_eq!(accepted.step, IntakeStep::AwaitingFiles);
}

#[tokio::test]
async fn attachment_cap_is_enforced() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;
    h.engine
        .post_message(&id, "Someone pushed me down the stairs")
        .await
        .unwrap();
    h.engine.post_message(&id, "yes").await.unwrap();

    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        assert!(h.engine.post_attachment(&id, attachment(name)).await.unwrap().accepted);
    }
    let over = h
        .engine
        .post_attachment(&id, attachment("4.jpg"))
        .await
        .unwrap();
    assert!(!over.accepted);
    assert_eq!(over.attachment_count, 3);
}

#[tokio::test]
async fn failed_report_creation_stays_confirming_and_retries() {
    let h = harness();
    let id = h.session_at_confirming().await;

    h.reports.fail_create.store(true, Ordering::SeqCst);
    let err = h.engine.post_message(&id, "yes").await.unwrap_err();
    assert!(matches!(err, IntakeError::Unavailable { .. }));
    assert!(err.reply().unwrap().contains("retry"));
    assert_eq!(
        h.engine.snapshot(&id).await.unwrap().step,
        IntakeStep::Confirming
    );

    h.reports.fail_create.store(false, Ordering::SeqCst);
    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(outcome.finalized);
    assert_eq!(h.repo.report_count().await, 1);
}

#[tokio::test]
async fn failure_after_creation_rolls_the_report_back() {
    let h = harness();
    let id = h.session_at_confirming().await;

    h.reports.fail_discussion.store(true, Ordering::SeqCst);
    let err = h.engine.post_message(&id, "yes").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.repo.report_count().await, 0);
    assert_eq!(h.repo.discussion_count().await, 0);

    let record = h.ledger.get_record(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Active);

    h.reports.fail_discussion.store(false, Ordering::SeqCst);
    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(outcome.finalized);
    assert_eq!(h.repo.report_count().await, 1);
    assert_eq!(h.repo.discussion_count().await, 1);
}

#[tokio::test]
async fn unknown_and_missing_sessions_are_contract_errors() {
    let h = harness();
    assert!(matches!(
        h.engine.post_message("CHAT-NOPE", "hello").await,
        Err(IntakeError::SessionNotFound(_))
    ));
    assert!(matches!(
        h.engine.post_message("  ", "hello").await,
        Err(IntakeError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.engine.post_attachment("CHAT-NOPE", attachment("a.jpg")).await,
        Err(IntakeError::SessionNotFound(_))
    ));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn sessions_recover_from_the_durable_record() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;

    // Simulates a process restart: the volatile state is gone.
    h.store.expire(&id).await.unwrap();

    let outcome = h
        .engine
        .post_message(&id, "Someone pushed me in the cafeteria")
        .await
        .unwrap();
    assert_eq!(outcome.step, IntakeStep::AwaitingEvidenceChoice);
}

#[tokio::test]
async fn completed_sessions_stay_completed_after_reclamation() {
    let h = harness();
    let id = h.session_at_confirming().await;
    h.engine.post_message(&id, "yes").await.unwrap();

    let purged = h
        .engine
        .purge_expired(Utc::now() + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(h.store.is_empty().await);

    let outcome = h.engine.post_message(&id, "yes").await.unwrap();
    assert!(!outcome.finalized);
    assert!(matches!(outcome.step, IntakeStep::Completed(_)));
    assert_eq!(h.create_calls(), 1);
}

#[tokio::test]
async fn idle_sessions_are_purged_but_fresh_ones_kept() {
    let h = harness();
    let id = h.engine.start_session(None).await.unwrap().session_id;

    assert_eq!(h.engine.purge_expired(Utc::now()).await.unwrap(), 0);
    let purged = h
        .engine
        .purge_expired(Utc::now() + Duration::hours(3))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(h.store.load(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn ended_sessions_refuse_messages() {
    let h = harness();
    let id = h.engine.start_session(None).await.unwrap().session_id;

    h.engine.end_session(&id).await.unwrap();
    assert!(matches!(
        h.engine.post_message(&id, ACTIVE_CODE).await,
        Err(IntakeError::SessionEnded(_))
    ));
    assert!(matches!(
        h.engine.end_session("CHAT-NOPE").await,
        Err(IntakeError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn history_records_both_sides() {
    let h = harness();
    let id = h
        .engine
        .start_session(Some(ACTIVE_CODE))
        .await
        .unwrap()
        .session_id;
    h.engine
        .post_message(&id, "Someone pushed me in the cafeteria")
        .await
        .unwrap();
    h.engine.post_message(&id, "yes").await.unwrap();
    h.engine
        .post_attachment(&id, attachment("a.jpg"))
        .await
        .unwrap();

    let history = h.engine.history(&id).await.unwrap();
    let senders: Vec<_> = history.iter().map(|e| e.sender).collect();
    assert_eq!(
        senders,
        vec![
            TranscriptSender::Assistant,
            TranscriptSender::User,
            TranscriptSender::Assistant,
            TranscriptSender::User,
            TranscriptSender::Assistant,
            TranscriptSender::User,
            TranscriptSender::Assistant,
        ]
    );
    assert_eq!(history[5].file_ref.as_deref(), Some("uploads/a.jpg"));
}

#[tokio::test]
async fn locks_are_released_for_unknown_and_ended_sessions() {
    let h = harness();
    for i in 0..50 {
        let bogus = format!("CHAT-BOGUS-{i}");
        assert!(h.engine.post_message(&bogus, "hello").await.is_err());
        assert!(h
            .engine
            .post_attachment(&bogus, attachment("a.jpg"))
            .await
            .is_err());
        assert!(h.engine.snapshot(&bogus).await.is_err());
        assert!(h.engine.end_session(&bogus).await.is_err());
    }
    assert_eq!(h.engine.lock_count().await, 0);

    let id = h.engine.start_session(None).await.unwrap().session_id;
    h.engine.post_message(&id, ACTIVE_CODE).await.unwrap();
    assert_eq!(h.engine.lock_count().await, 1);

    h.engine.end_session(&id).await.unwrap();
    assert_eq!(h.engine.lock_count().await, 0);
    assert!(matches!(
        h.engine.post_message(&id, "hello again").await,
        Err(IntakeError::SessionEnded(_))
    ));
    assert_eq!(h.engine.lock_count().await, 0);
}

#[tokio::test]
async fn purge_releases_locks_of_reclaimed_sessions() {
    let h = harness();
    let id = h.engine.start_session(None).await.unwrap().session_id;
    h.engine.post_message(&id, ACTIVE_CODE).await.unwrap();
    assert_eq!(h.engine.lock_count().await, 1);

    h.engine
        .purge_expired(Utc::now() + Duration::hours(3))
        .await
        .unwrap();
    assert_eq!(h.engine.lock_count().await, 0);
}

#[tokio::test]
async fn ending_an_unfinished_session_discards_its_uploads() {
    let h = harness();
    let (id, storage_ref) = h.session_with_upload().await;
    assert!(h.storage.contains(&storage_ref).await);

    h.engine.end_session(&id).await.unwrap();
    assert!(!h.storage.contains(&storage_ref).await);
}

#[tokio::test]
async fn ending_after_a_restart_discards_recorded_uploads() {
    let h = harness();
    let (id, storage_ref) = h.session_with_upload().await;
    h.store.expire(&id).await.unwrap();

    h.engine.end_session(&id).await.unwrap();
    assert!(!h.storage.contains(&storage_ref).await);
}

#[tokio::test]
async fn idle_purge_discards_uploads_but_completed_reports_keep_theirs() {
    let h = harness();
    let (idle, idle_ref) = h.session_with_upload().await;

    let (done, done_ref) = h.session_with_upload().await;
    h.engine.post_message(&done, "done").await.unwrap();
    let outcome = h.engine.post_message(&done, "yes").await.unwrap();
    assert!(outcome.finalized);

    let purged = h
        .engine
        .purge_expired(Utc::now() + Duration::hours(3))
        .await
        .unwrap();
    assert_eq!(purged, 2);
    assert!(!h.storage.contains(&idle_ref).await);
    assert!(h.storage.contains(&done_ref).await);
    assert_eq!(h.storage.file_count().await, 1);
    assert!(h.store.load(&idle).await.unwrap().is_none());
}

#[tokio::test]
async fn recovery_discards_uploads_the_lost_state_held() {
    let h = harness();
    let (id, storage_ref) = h.session_with_upload().await;
    h.store.expire(&id).await.unwrap();

    let snapshot = h.engine.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.step, IntakeStep::AwaitingNarrative);
    assert!(snapshot.attachments.is_empty());
    assert!(!h.storage.contains(&storage_ref).await);
}

/// A ledger whose completed records have lost their report link.
struct ReportlessLedger {
    inner: InMemorySessionLedger,
}

#[async_trait]
impl SessionLedger for ReportlessLedger {
    async fn create_record(&self, session_id: &str) -> PortResult<SessionRecord> {
        self.inner.create_record(session_id).await
    }

    async fn get_record(&self, session_id: &str) -> PortResult<Option<SessionRecord>> {
        Ok(self.inner.get_record(session_id).await?.map(|mut record| {
            record.report_id = None;
            record
        }))
    }

    async fn link_school(&self, session_id: &str, school_code: &str) -> PortResult<()> {
        self.inner.link_school(session_id, school_code).await
    }

    async fn mark_completed(&self, session_id: &str, report_id: Uuid) -> PortResult<()> {
        self.inner.mark_completed(session_id, report_id).await
    }

    async fn mark_ended(&self, session_id: &str) -> PortResult<()> {
        self.inner.mark_ended(session_id).await
    }

    async fn append_transcript(
        &self,
        session_id: &str,
        sender: TranscriptSender,
        text: &str,
        file_ref: Option<&str>,
    ) -> PortResult<()> {
        self.inner
            .append_transcript(session_id, sender, text, file_ref)
            .await
    }

    async fn transcript(&self, session_id: &str) -> PortResult<Vec<TranscriptEntry>> {
        self.inner.transcript(session_id).await
    }
}

#[tokio::test]
async fn completed_record_without_report_is_not_recovered() {
    let schools = Arc::new(InMemorySchoolDirectory::new());
    let ledger = Arc::new(ReportlessLedger {
        inner: InMemorySessionLedger::new(),
    });
    let store = Arc::new(InMemorySessionStore::new());
    let engine = IntakeEngine::new(
        schools.clone(),
        Arc::new(InMemoryReportRepository::new(schools)),
        ledger.clone(),
        store.clone(),
        Arc::new(InMemoryAttachmentStorage::new()),
        IntakeSettings::default(),
    );

    let id = engine.start_session(None).await.unwrap().session_id;
    ledger.mark_completed(&id, Uuid::new_v4()).await.unwrap();
    store.expire(&id).await.unwrap();

    let result = engine.post_message(&id, "hello").await;
    assert!(matches!(result, Err(IntakeError::Unavailable { .. })));
}
