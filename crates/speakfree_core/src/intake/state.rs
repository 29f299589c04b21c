//! crates/speakfree_core/src/intake/state.rs
//!
//! The volatile state of one intake conversation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::classifier::classify;
use crate::domain::{Attachment, Classification, School};

/// The report a completed session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedReport {
    pub report_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// Where a conversation currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeStep {
    AwaitingSchool,
    AwaitingNarrative,
    AwaitingEvidenceChoice,
    AwaitingFiles,
    Confirming,
    /// Terminal. Carries the only reference to the created report.
    Completed(FinalizedReport),
}

impl IntakeStep {
    pub fn name(&self) -> &'static str {
        match self {
            IntakeStep::AwaitingSchool => "awaiting_school",
            IntakeStep::AwaitingNarrative => "awaiting_narrative",
            IntakeStep::AwaitingEvidenceChoice => "awaiting_evidence_choice",
            IntakeStep::AwaitingFiles => "awaiting_files",
            IntakeStep::Confirming => "confirming",
            IntakeStep::Completed(_) => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeSession {
    pub session_id: String,
    pub step: IntakeStep,
    pub school: Option<School>,
    pub narrative: String,
    pub classification: Option<Classification>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl IntakeSession {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            step: IntakeStep::AwaitingSchool,
            school: None,
            narrative: String::new(),
            classification: None,
            attachments: Vec::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn finalized(&self) -> Option<&FinalizedReport> {
        match &self.step {
            IntakeStep::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.finalized().is_some()
    }

    /// Whether the janitor may drop this session at `now`.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        idle_ttl: chrono::Duration,
        completed_ttl: chrono::Duration,
    ) -> bool {
        match self.finalized() {
            Some(report) => now - report.completed_at >= completed_ttl,
            None => now - self.last_activity_at >= idle_ttl,
        }
    }

    /// Links the school. The first resolved school sticks.
    pub(crate) fn link_school(&mut self, school: School) {
        if self.school.is_none() {
            self.school = Some(school);
        }
    }

    pub(crate) fn set_narrative(&mut self, text: &str) {
        self.narrative = text.to_string();
        self.classification = Some(classify(&self.narrative));
    }

    pub(crate) fn extend_narrative(&mut self, text: &str) {
        if !self.narrative.is_empty() {
            self.narrative.push_str("\n\n");
        }
        self.narrative.push_str(text);
        self.classification = Some(classify(&self.narrative));
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }
}
