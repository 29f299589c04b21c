//! crates/speakfree_core/src/intake/engine.rs
//!
//! The intake state machine and the per-session serialization around it.
//!
//! Each inbound message is handled under that session's mutex: load, transition on a
//! private copy, then save. A transition that fails saves nothing, so a collaborator
//! failure can never leave the session half-advanced.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::codes;
use crate::domain::{
    Attachment, CreatedReport, NewReport, SessionStatus, TranscriptEntry, TranscriptSender,
};
use crate::ports::{
    AttachmentStorage, PortError, PortResult, ReportRepository, SchoolDirectory, SessionLedger,
    SessionStore,
};

use super::keywords::{self, Answer};
use super::replies;
use super::state::{FinalizedReport, IntakeSession, IntakeStep};

//=========================================================================================
// Settings, Outcomes and Errors
//=========================================================================================

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub min_narrative_chars: usize,
    pub max_attachments: usize,
    /// How long an unfinished session may sit idle before it is reclaimed.
    pub idle_ttl: Duration,
    /// How long a completed session stays in memory after finalization.
    pub completed_ttl: Duration,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            min_narrative_chars: 10,
            max_attachments: 10,
            idle_ttl: Duration::hours(2),
            completed_ttl: Duration::seconds(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStarted {
    pub session_id: String,
    pub reply: String,
    pub step: IntakeStep,
}

#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub reply: String,
    pub step: IntakeStep,
    pub finalized: bool,
    pub tracking_code: Option<String>,
    pub discussion_code: Option<String>,
}

impl MessageOutcome {
    fn reply(reply: String, step: &IntakeStep) -> Self {
        Self {
            reply,
            step: step.clone(),
            finalized: false,
            tracking_code: None,
            discussion_code: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentOutcome {
    pub reply: String,
    pub step: IntakeStep,
    pub attachment_count: usize,
    /// False when the flow refused the file; the caller should discard the stored bytes.
    pub accepted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Intake session not found: {0}")]
    SessionNotFound(String),
    #[error("Intake session has ended: {0}")]
    SessionEnded(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// A collaborator failed. Nothing was advanced; the reporter may simply retry.
    #[error("Service temporarily unavailable: {cause}")]
    Unavailable {
        reply: String,
        #[source]
        cause: PortError,
    },
}

impl IntakeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IntakeError::Unavailable { .. })
    }

    /// The conversational message to show the reporter, when there is one.
    pub fn reply(&self) -> Option<&str> {
        match self {
            IntakeError::Unavailable { reply, .. } => Some(reply),
            _ => None,
        }
    }
}

fn unavailable(reply: String, cause: PortError) -> IntakeError {
    IntakeError::Unavailable { reply, cause }
}

fn port_down(cause: PortError) -> IntakeError {
    unavailable(replies::service_unavailable(), cause)
}

fn require_session_id(session_id: &str) -> Result<&str, IntakeError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::InvalidRequest(
            "a session id is required".to_string(),
        ));
    }
    Ok(trimmed)
}

/// The session does not exist, or no longer accepts anything.
fn is_gone<T>(result: &Result<T, IntakeError>) -> bool {
    matches!(
        result,
        Err(IntakeError::SessionNotFound(_) | IntakeError::SessionEnded(_))
    )
}

//=========================================================================================
// The Engine
//=========================================================================================

pub struct IntakeEngine {
    directory: Arc<dyn SchoolDirectory>,
    reports: Arc<dyn ReportRepository>,
    ledger: Arc<dyn SessionLedger>,
    store: Arc<dyn SessionStore>,
    storage: Arc<dyn AttachmentStorage>,
    settings: IntakeSettings,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IntakeEngine {
    pub fn new(
        directory: Arc<dyn SchoolDirectory>,
        reports: Arc<dyn ReportRepository>,
        ledger: Arc<dyn SessionLedger>,
        store: Arc<dyn SessionStore>,
        storage: Arc<dyn AttachmentStorage>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            directory,
            reports,
            ledger,
            store,
            storage,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &IntakeSettings {
        &self.settings
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops a session's lock entry unless someone still holds or waits on it.
    /// Callers must have released their own clone first.
    async fn forget_lock(&self, session_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    // --- Inbound operations ---

    /// Opens a new conversation, optionally with the school code already known.
    pub async fn start_session(
        &self,
        school_code: Option<&str>,
    ) -> Result<SessionStarted, IntakeError> {
        let code = school_code.map(str::trim).filter(|c| !c.is_empty());
        let resolved = match code {
            Some(code) => Some(self.directory.resolve(code).await.map_err(port_down)?),
            None => None,
        };

        let session_id = codes::session_id();
        self.ledger
            .create_record(&session_id)
            .await
            .map_err(port_down)?;

        let mut session = IntakeSession::new(session_id.clone(), Utc::now());
        let reply = match resolved {
            None => replies::welcome(),
            Some(None) => replies::school_not_found(),
            Some(Some(school)) if !school.accepts_reports() => {
                replies::school_inactive(&school.name)
            }
            Some(Some(school)) => {
                self.ledger
                    .link_school(&session_id, &school.code)
                    .await
                    .map_err(port_down)?;
                let reply = replies::school_found(&school.name);
                session.link_school(school);
                session.step = IntakeStep::AwaitingNarrative;
                reply
            }
        };

        self.store.save(session.clone()).await.map_err(port_down)?;
        self.record(&session_id, TranscriptSender::Assistant, &reply, None)
            .await;

        info!(session_id = %session_id, step = session.step.name(), "Intake session started");
        Ok(SessionStarted {
            session_id,
            reply,
            step: session.step,
        })
    }

    /// Feeds one reporter message through the state machine.
    pub async fn post_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageOutcome, IntakeError> {
        let session_id = require_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.handle_message(session_id, text).await
        };
        drop(lock);
        if is_gone(&result) {
            self.forget_lock(session_id).await;
        }
        result
    }

    async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageOutcome, IntakeError> {
        let mut session = self.load_or_recover(session_id).await?;
        self.record(session_id, TranscriptSender::User, text, None)
            .await;

        if session.is_completed() {
            let outcome = MessageOutcome::reply(replies::already_submitted(), &session.step);
            self.record(session_id, TranscriptSender::Assistant, &outcome.reply, None)
                .await;
            return Ok(outcome);
        }

        let from = session.step.name();
        let outcome = match self.transition(&mut session, text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %session_id, step = from, "Intake transition failed: {}", e);
                if let Some(reply) = e.reply() {
                    self.record(session_id, TranscriptSender::Assistant, reply, None)
                        .await;
                }
                return Err(e);
            }
        };
        session.touch(Utc::now());

        if let Err(e) = self.store.save(session).await {
            if !outcome.finalized {
                return Err(port_down(e));
            }
            // The durable record already says completed, which is what recovery reads.
            error!(session_id = %session_id, "Finalized session could not be saved: {:?}", e);
            if let Err(e) = self.store.expire(session_id).await {
                error!(session_id = %session_id, "Failed to expire session after save error: {:?}", e);
            }
        }

        debug!(session_id = %session_id, from, to = outcome.step.name(), "Intake transition");
        self.record(session_id, TranscriptSender::Assistant, &outcome.reply, None)
            .await;
        Ok(outcome)
    }

    /// Attributes an already stored file to the session.
    pub async fn post_attachment(
        &self,
        session_id: &str,
        attachment: Attachment,
    ) -> Result<AttachmentOutcome, IntakeError> {
        let session_id = require_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.handle_attachment(session_id, attachment).await
        };
        drop(lock);
        if is_gone(&result) {
            self.forget_lock(session_id).await;
        }
        result
    }

    async fn handle_attachment(
        &self,
        session_id: &str,
        attachment: Attachment,
    ) -> Result<AttachmentOutcome, IntakeError> {
        let mut session = self.load_or_recover(session_id).await?;
        let refuse = |reply: String, session: &IntakeSession| AttachmentOutcome {
            reply,
            step: session.step.clone(),
            attachment_count: session.attachments.len(),
            accepted: false,
        };

        match session.step {
            IntakeStep::AwaitingEvidenceChoice | IntakeStep::AwaitingFiles => {}
            IntakeStep::Completed(_) => {
                return Ok(refuse(replies::already_submitted(), &session));
            }
            _ => {
                info!(session_id = %session_id, step = session.step.name(), "Attachment refused outside the upload step");
                return Ok(refuse(replies::attachment_not_expected(), &session));
            }
        }
        if session.attachments.len() >= self.settings.max_attachments {
            return Ok(refuse(
                replies::attachment_limit(self.settings.max_attachments),
                &session,
            ));
        }

        // An upload while we wait for a yes/no is taken as a yes.
        session.step = IntakeStep::AwaitingFiles;
        let name = attachment.original_name.clone();
        let storage_ref = attachment.storage_ref.clone();
        session.attachments.push(attachment);
        session.touch(Utc::now());

        let count = session.attachments.len();
        let reply = replies::file_received(&name, count);
        let step = session.step.clone();
        self.store.save(session).await.map_err(port_down)?;

        self.record(
            session_id,
            TranscriptSender::User,
            &format!("[file] {name}"),
            Some(&storage_ref),
        )
        .await;
        self.record(session_id, TranscriptSender::Assistant, &reply, None)
            .await;

        info!(session_id = %session_id, count, "Attachment added");
        Ok(AttachmentOutcome {
            reply,
            step,
            attachment_count: count,
            accepted: true,
        })
    }

    /// Closes a conversation on the reporter's request. Uploads that never made it into
    /// a report are deleted.
    pub async fn end_session(&self, session_id: &str) -> Result<(), IntakeError> {
        let session_id = require_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.handle_end(session_id).await
        };
        drop(lock);
        if result.is_ok() || is_gone(&result) {
            self.forget_lock(session_id).await;
        }
        result
    }

    async fn handle_end(&self, session_id: &str) -> Result<(), IntakeError> {
        let record = self
            .ledger
            .get_record(session_id)
            .await
            .map_err(port_down)?
            .ok_or_else(|| IntakeError::SessionNotFound(session_id.to_string()))?;

        let was_active = record.status == SessionStatus::Active;
        if was_active {
            self.ledger
                .mark_ended(session_id)
                .await
                .map_err(port_down)?;
        }
        let dropped = self.store.expire(session_id).await.map_err(port_down)?;
        if was_active {
            match dropped {
                Some(session) => self.discard_uploads(&session).await,
                None => self.discard_recorded_uploads(session_id).await,
            }
        }

        info!(session_id = %session_id, "Intake session ended");
        Ok(())
    }

    /// The current state of a session, recovering it from the durable record if needed.
    pub async fn snapshot(&self, session_id: &str) -> Result<IntakeSession, IntakeError> {
        let session_id = require_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.load_or_recover(session_id).await
        };
        drop(lock);
        if is_gone(&result) {
            self.forget_lock(session_id).await;
        }
        result
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, IntakeError> {
        let session_id = require_session_id(session_id)?;
        self.ledger
            .get_record(session_id)
            .await
            .map_err(port_down)?
            .ok_or_else(|| IntakeError::SessionNotFound(session_id.to_string()))?;
        self.ledger.transcript(session_id).await.map_err(port_down)
    }

    /// Reclaims idle and completed sessions from volatile storage. Uploads held by idle
    /// sessions are deleted along with them.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, IntakeError> {
        let removed = self
            .store
            .purge_expired(now, self.settings.idle_ttl, self.settings.completed_ttl)
            .await
            .map_err(port_down)?;

        for session in &removed {
            self.forget_lock(&session.session_id).await;
            self.discard_uploads(session).await;
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "Purged expired intake sessions");
        }
        Ok(removed.len())
    }

    // --- Transitions ---

    async fn transition(
        &self,
        session: &mut IntakeSession,
        text: &str,
    ) -> Result<MessageOutcome, IntakeError> {
        let step = session.step.clone();
        let reply = match step {
            IntakeStep::AwaitingSchool => self.on_school_code(session, text).await?,
            IntakeStep::AwaitingNarrative => self.on_narrative(session, text),
            IntakeStep::AwaitingEvidenceChoice => match keywords::evidence_choice(text) {
                Answer::Affirmative => {
                    session.step = IntakeStep::AwaitingFiles;
                    replies::waiting_files()
                }
                Answer::Negative => {
                    session.step = IntakeStep::Confirming;
                    replies::confirm_summary(session)
                }
                Answer::Unrecognized if text.trim().is_empty() => replies::ask_evidence_again(),
                Answer::Unrecognized => {
                    // Reporters often answer with more detail instead of yes/no.
                    session.extend_narrative(text.trim());
                    session.step = IntakeStep::Confirming;
                    replies::confirm_summary(session)
                }
            },
            IntakeStep::AwaitingFiles => {
                if keywords::files_done(text) {
                    session.step = IntakeStep::Confirming;
                    replies::confirm_summary(session)
                } else {
                    replies::still_waiting_files(session.attachments.len())
                }
            }
            IntakeStep::Confirming => match keywords::confirmation(text) {
                Answer::Affirmative => return self.finalize(session).await,
                Answer::Negative => {
                    session.step = IntakeStep::AwaitingNarrative;
                    replies::restart_narrative()
                }
                Answer::Unrecognized => replies::confirm_again(),
            },
            IntakeStep::Completed(_) => replies::already_submitted(),
        };
        Ok(MessageOutcome::reply(reply, &session.step))
    }

    async fn on_school_code(
        &self,
        session: &mut IntakeSession,
        text: &str,
    ) -> Result<String, IntakeError> {
        let code = text.trim();
        if code.is_empty() {
            return Ok(replies::ask_school_code());
        }

        let school = match self.directory.resolve(code).await.map_err(port_down)? {
            None => return Ok(replies::school_not_found()),
            Some(school) if !school.accepts_reports() => {
                info!(session_id = %session.session_id, school = %school.code, status = school.status.as_str(), "School not eligible for intake");
                return Ok(replies::school_inactive(&school.name));
            }
            Some(school) => school,
        };

        self.ledger
            .link_school(&session.session_id, &school.code)
            .await
            .map_err(port_down)?;
        let reply = replies::school_found(&school.name);
        session.link_school(school);
        session.step = IntakeStep::AwaitingNarrative;
        Ok(reply)
    }

    fn on_narrative(&self, session: &mut IntakeSession, text: &str) -> String {
        let narrative = text.trim();
        if narrative.is_empty() {
            return replies::narrative_empty();
        }
        if narrative.chars().count() < self.settings.min_narrative_chars {
            return replies::narrative_too_short(self.settings.min_narrative_chars);
        }

        session.set_narrative(narrative);
        session.step = IntakeStep::AwaitingEvidenceChoice;
        match &session.classification {
            Some(classification) => replies::ask_evidence(classification),
            None => replies::ask_evidence(&classify(&session.narrative)),
        }
    }

    // --- Finalization ---

    async fn finalize(&self, session: &mut IntakeSession) -> Result<MessageOutcome, IntakeError> {
        let school = session.school.clone().ok_or_else(|| {
            IntakeError::InvalidRequest("the session has no school linked".to_string())
        })?;
        let classification = session
            .classification
            .clone()
            .unwrap_or_else(|| classify(&session.narrative));

        let new_report = NewReport {
            school_id: school.id,
            category: classification.category,
            narrative: session.narrative.clone(),
            date_hint: classification.date_hint.clone(),
            location_hint: classification.location_hint.clone(),
            chat_session_id: session.session_id.clone(),
        };

        let created = self.reports.create_report(new_report).await.map_err(|e| {
            error!(session_id = %session.session_id, "Failed to create report: {:?}", e);
            unavailable(replies::finalize_failed(), e)
        })?;

        if let Err(e) = self.complete_finalization(session, &created).await {
            error!(
                session_id = %session.session_id,
                report_id = %created.report_id,
                "Finalization failed after report creation, rolling back: {:?}", e
            );
            if let Err(rollback) = self.reports.discard_report(created.report_id).await {
                error!(report_id = %created.report_id, "Failed to discard report: {:?}", rollback);
            }
            return Err(unavailable(replies::finalize_failed(), e));
        }

        session.step = IntakeStep::Completed(FinalizedReport {
            report_id: created.report_id,
            completed_at: Utc::now(),
        });
        info!(
            session_id = %session.session_id,
            report_id = %created.report_id,
            category = classification.category.as_str(),
            attachments = session.attachments.len(),
            "Report finalized"
        );

        Ok(MessageOutcome {
            reply: replies::report_created(
                &created.tracking_code,
                &created.discussion_code,
                &school.name,
            ),
            step: session.step.clone(),
            finalized: true,
            tracking_code: Some(created.tracking_code),
            discussion_code: Some(created.discussion_code),
        })
    }

    async fn complete_finalization(
        &self,
        session: &IntakeSession,
        created: &CreatedReport,
    ) -> PortResult<()> {
        for attachment in &session.attachments {
            self.reports.attach_file(created.report_id, attachment).await?;
        }
        self.reports
            .open_discussion(created.report_id, &created.discussion_code)
            .await?;
        self.ledger
            .mark_completed(&session.session_id, created.report_id)
            .await
    }

    // --- Helpers ---

    async fn load_or_recover(&self, session_id: &str) -> Result<IntakeSession, IntakeError> {
        if let Some(session) = self.store.load(session_id).await.map_err(port_down)? {
            return Ok(session);
        }

        let record = self
            .ledger
            .get_record(session_id)
            .await
            .map_err(port_down)?
            .ok_or_else(|| IntakeError::SessionNotFound(session_id.to_string()))?;

        let mut session = IntakeSession::new(session_id, Utc::now());
        session.created_at = record.created_at;
        match record.status {
            SessionStatus::Ended => {
                return Err(IntakeError::SessionEnded(session_id.to_string()));
            }
            SessionStatus::Completed => {
                let Some(report_id) = record.report_id else {
                    error!(session_id = %session_id, "Completed session record has no report id");
                    return Err(port_down(PortError::Unexpected(format!(
                        "completed session {} has no report id",
                        session_id
                    ))));
                };
                session.step = IntakeStep::Completed(FinalizedReport {
                    report_id,
                    completed_at: record.updated_at,
                });
            }
            SessionStatus::Active => {
                // Files uploaded before the state was lost belong to no report now.
                self.discard_recorded_uploads(session_id).await;
                if let Some(code) = record.school_code.as_deref() {
                    match self.directory.resolve(code).await.map_err(port_down)? {
                        Some(school) if school.accepts_reports() => {
                            session.link_school(school);
                            session.step = IntakeStep::AwaitingNarrative;
                        }
                        _ => {
                            warn!(session_id = %session_id, school = code, "Linked school is no longer eligible");
                        }
                    }
                }
            }
        }

        info!(session_id = %session_id, step = session.step.name(), "Recovered intake session from its durable record");
        Ok(session)
    }

    /// Deletes the stored files of a session that never produced a report.
    async fn discard_uploads(&self, session: &IntakeSession) {
        if session.is_completed() {
            return;
        }
        for attachment in &session.attachments {
            self.remove_upload(&session.session_id, &attachment.storage_ref)
                .await;
        }
    }

    /// Deletes the files a session's transcript points at, for when the volatile state
    /// holding them is gone.
    async fn discard_recorded_uploads(&self, session_id: &str) {
        let transcript = match self.ledger.transcript(session_id).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(session_id = %session_id, "Could not read transcript to clean up uploads: {:?}", e);
                return;
            }
        };
        for storage_ref in transcript.iter().filter_map(|e| e.file_ref.as_deref()) {
            self.remove_upload(session_id, storage_ref).await;
        }
    }

    async fn remove_upload(&self, session_id: &str, storage_ref: &str) {
        match self.storage.remove(storage_ref).await {
            Ok(()) => debug!(session_id = %session_id, storage_ref, "Removed orphaned upload"),
            Err(e) => {
                warn!(session_id = %session_id, storage_ref, "Failed to remove orphaned upload: {:?}", e)
            }
        }
    }

    /// Appends to the transcript. Failures are logged, never surfaced.
    async fn record(
        &self,
        session_id: &str,
        sender: TranscriptSender,
        text: &str,
        file_ref: Option<&str>,
    ) {
        if let Err(e) = self
            .ledger
            .append_transcript(session_id, sender, text, file_ref)
            .await
        {
            warn!(session_id = %session_id, "Failed to append transcript entry: {:?}", e);
        }
    }
}
