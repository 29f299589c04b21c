//! Small synonym sets recognised at the yes/no steps of the conversation.
//!
//! Matching is done on the whole message after normalization, so "Oui !" and "YES."
//! both count as a yes while "yes but also..." does not.

use crate::classifier::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Answer {
    Affirmative,
    Negative,
    Unrecognized,
}

const EVIDENCE_YES: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "photo", "photos", "video", "videos",
    "proof", "evidence", "file", "files", "oui", "o", "ouais", "preuve", "preuves", "fichier",
    "fichiers",
];

const EVIDENCE_NO: &[&str] = &[
    "no", "n", "nope", "none", "nothing", "skip", "send", "non", "pas", "aucun", "aucune", "rien",
    "envoyer", "envoi", "terminer", "termine", "signaler",
];

const FILES_DONE: &[&str] = &[
    "done", "send", "finished", "finish", "submit", "ok", "that's all", "thats all", "termine",
    "terminer", "fini", "envoyer", "envoi", "c'est bon", "cest bon", "valider",
];

const CONFIRM_YES: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "confirm", "confirmed", "send", "send it",
    "submit", "oui", "o", "ouais", "confirme", "confirmer", "valide", "valider", "envoie",
    "envoyer", "d'accord", "daccord",
];

const CONFIRM_NO: &[&str] = &[
    "no", "n", "nope", "cancel", "change", "modify", "edit", "restart", "non", "annule",
    "annuler", "modifier", "changer",
];

fn canonical(text: &str) -> String {
    normalize(text)
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | '"'))
        .to_string()
}

fn classify_answer(text: &str, yes: &[&str], no: &[&str]) -> Answer {
    let word = canonical(text);
    if yes.contains(&word.as_str()) {
        Answer::Affirmative
    } else if no.contains(&word.as_str()) {
        Answer::Negative
    } else {
        Answer::Unrecognized
    }
}

/// Answer to "do you have evidence to add?".
pub(crate) fn evidence_choice(text: &str) -> Answer {
    classify_answer(text, EVIDENCE_YES, EVIDENCE_NO)
}

/// Answer to "do you confirm sending the report?".
pub(crate) fn confirmation(text: &str) -> Answer {
    classify_answer(text, CONFIRM_YES, CONFIRM_NO)
}

/// Whether the reporter says they are done uploading files.
pub(crate) fn files_done(text: &str) -> bool {
    FILES_DONE.contains(&canonical(text).as_str())
}
