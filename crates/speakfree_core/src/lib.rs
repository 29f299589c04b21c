pub mod classifier;
pub mod codes;
pub mod domain;
pub mod intake;
pub mod memory;
pub mod ports;
pub mod session_store;
pub mod uploads;

pub use classifier::classify;
pub use domain::{
    Attachment, Classification, CreatedReport, DiscussionMessage, DiscussionSender,
    DiscussionStatus, DiscussionThread, IncidentCategory, NewReport, ReportStatus,
    ReportStatusView, School, SchoolStatus, SessionRecord, SessionStatus, StoredFile,
    TranscriptEntry, TranscriptSender,
};
pub use intake::{
    AttachmentOutcome, IntakeEngine, IntakeError, IntakeSession, IntakeSettings, IntakeStep,
    MessageOutcome, SessionStarted,
};
pub use ports::{
    AttachmentStorage, PortError, PortResult, ReportRepository, SchoolDirectory, SessionLedger,
    SessionStore,
};
pub use session_store::InMemorySessionStore;
