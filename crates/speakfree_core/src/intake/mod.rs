//! crates/speakfree_core/src/intake/mod.rs
//!
//! The conversational intake flow: turns a multi-turn anonymous chat into one
//! report plus a discussion channel.

mod engine;
mod keywords;
mod replies;
pub mod state;

#[cfg(test)]
mod tests;

pub use engine::{
    AttachmentOutcome, IntakeEngine, IntakeError, IntakeSettings, MessageOutcome, SessionStarted,
};
pub use state::{FinalizedReport, IntakeSession, IntakeStep};
