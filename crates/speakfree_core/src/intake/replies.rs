//! The assistant's side of the conversation.
//!
//! Every re-prompt says what input is expected; none of them expose error codes.

use crate::domain::Classification;

use super::state::IntakeSession;

pub(crate) fn welcome() -> String {
    "Hi! I'm **Haniel**, your SpeakFree assistant.\n\n\
     I'm here to help you report a problem to your school, **anonymously and safely**.\n\n\
     To begin, **what is your school's code?**\n\
     _(You'll find it on your school's SpeakFree poster, or ask a trusted adult.)_"
        .to_string()
}

pub(crate) fn ask_school_code() -> String {
    "Please type your school's code to begin. It looks like **ECOLE-XXXXXX**.".to_string()
}

pub(crate) fn school_not_found() -> String {
    "I couldn't find a school with that code.\n\n\
     Check the code and try again, or ask a trusted adult.\n\
     The code looks like **ECOLE-XXXXXX**."
        .to_string()
}

pub(crate) fn school_inactive(name: &str) -> String {
    format!(
        "**{name}** is not accepting reports through SpeakFree yet.\n\n\
         Check the code with a trusted adult, or try another code."
    )
}

pub(crate) fn school_found(name: &str) -> String {
    format!(
        "Great, you're at **{name}**.\n\n\
         Now **tell me what happened**. Take your time and share whatever you want. I'm listening."
    )
}

pub(crate) fn narrative_empty() -> String {
    "I didn't get anything. **Tell me what happened**, in your own words.".to_string()
}

pub(crate) fn narrative_too_short(min_chars: usize) -> String {
    format!(
        "Could you tell me a little more? A few words about **what happened** \
         (at least {min_chars} characters) help your school understand."
    )
}

fn classification_lines(classification: &Classification) -> String {
    let mut lines = format!("Type: {}", classification.category.label());
    if let Some(date) = &classification.date_hint {
        lines.push_str(&format!("\nWhen: {date}"));
    }
    if let Some(location) = &classification.location_hint {
        lines.push_str(&format!("\nWhere: {location}"));
    }
    lines
}

pub(crate) fn ask_evidence(classification: &Classification) -> String {
    format!(
        "Thank you for trusting me.\n\n\
         **Here's what I understood:**\n{}\n\n\
         **Do you have evidence to add?** (photos, videos, screenshots)\n\
         - Answer **\"yes\"** to add files\n\
         - Answer **\"no\"** to send the report directly",
        classification_lines(classification)
    )
}

pub(crate) fn ask_evidence_again() -> String {
    "Answer **\"yes\"** to add photos or videos, or **\"no\"** to continue without them."
        .to_string()
}

pub(crate) fn waiting_files() -> String {
    "**Send me your files** (photos, videos, screenshots).\n\n\
     When you're finished, answer **\"done\"** or **\"send\"** to continue."
        .to_string()
}

pub(crate) fn still_waiting_files(count: usize) -> String {
    format!(
        "I have {count} file(s) so far. Upload more, or answer **\"done\"** when you're finished."
    )
}

pub(crate) fn file_received(original_name: &str, count: usize) -> String {
    format!(
        "File received: **{original_name}** ({count} so far).\n\n\
         You can add more, or answer **\"done\"** to continue."
    )
}

pub(crate) fn attachment_limit(max: usize) -> String {
    format!(
        "You've reached the limit of {max} files. Answer **\"done\"** to continue with what you sent."
    )
}

pub(crate) fn attachment_not_expected() -> String {
    "I can't take files at this point of our conversation. \
     I'll ask you for evidence right after you tell me what happened."
        .to_string()
}

pub(crate) fn confirm_summary(session: &IntakeSession) -> String {
    let classification = session
        .classification
        .clone()
        .unwrap_or_else(|| crate::classifier::classify(&session.narrative));
    let date = classification
        .date_hint
        .as_deref()
        .unwrap_or("Not specified");
    let location = classification
        .location_hint
        .as_deref()
        .unwrap_or("Not specified");
    let files = match session.attachments.len() {
        0 => "None".to_string(),
        n => format!("{n} file(s)"),
    };
    format!(
        "**Summary of your report:**\n\n\
         Type: {}\nDate: {date}\nPlace: {location}\nAttached files: {files}\n\n\
         **What you told me:**\n{}\n\n\
         **Do you confirm sending it?**\n\
         Answer **\"yes\"** to send it to your school, or **\"no\"** to change it.",
        classification.category.label(),
        session.narrative
    )
}

pub(crate) fn confirm_again() -> String {
    "Answer **\"yes\"** to send the report, or **\"no\"** to change it.".to_string()
}

pub(crate) fn restart_narrative() -> String {
    "Okay, let's start again. **Tell me what happened.**".to_string()
}

pub(crate) fn report_created(tracking_code: &str, discussion_code: &str, school_name: &str) -> String {
    format!(
        "**Done! Your report was sent to {school_name}.**\n\n\
         Tracking code: `{tracking_code}`\n\
         Discussion code: `{discussion_code}`\n\n\
         **Keep these codes somewhere safe.** You can use them to:\n\
         - follow the progress of your report\n\
         - talk anonymously with your school\n\n\
         You were brave to speak up.\n\n\
         **Need urgent help?** Call **3020** (anti-bullying line) or **119** (children in danger)."
    )
}

pub(crate) fn already_submitted() -> String {
    "Your report has already been sent!\n\n\
     To make a new report, start a new conversation."
        .to_string()
}

pub(crate) fn finalize_failed() -> String {
    "I couldn't send your report just now. Nothing was lost.\n\n\
     Answer **\"yes\"** again in a moment to retry."
        .to_string()
}

pub(crate) fn service_unavailable() -> String {
    "I'm having a technical problem right now. Please send your last message again in a moment."
        .to_string()
}
