//! crates/speakfree_core/src/classifier.rs
//!
//! Keyword-based classification of a reporter's narrative.
//!
//! The result is advisory: it is echoed back to the reporter for confirmation and
//! stored with the report, but nothing in the intake flow branches on it.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::domain::{Classification, IncidentCategory};

/// Folds text to the form every keyword table is written against:
/// diacritics stripped, lower-cased, trimmed, typographic apostrophes made plain.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid classifier pattern {pattern:?}: {e}"))
}

// Checked in order; the first group that matches decides the category.
static CATEGORY_GROUPS: LazyLock<Vec<(IncidentCategory, Regex)>> = LazyLock::new(|| {
    vec![
        (
            IncidentCategory::Harassment,
            compile(
                r"harass|harcel|bull(y|ie|ying)|mock|moque|insult|humili|embete|surnom|nickname|rumou?r|exclu|rejete|isole|left out|mechant|\bteas",
            ),
        ),
        (
            IncidentCategory::PhysicalViolence,
            compile(
                r"push|shov|\bhit\b|\bhits\b|punch|kick|slap|\bbeat|fight|hurt|injur|frappe|\btape\b|\bcoups?\b|bagarre|pousse|bouscul|blesse|cogne|gifle|\bbat\b|battu|violen|fait mal",
            ),
        ),
        (
            IncidentCategory::CyberHarassment,
            compile(
                r"cyber|online|internet|social media|instagram|snap|tiktok|facebook|whatsapp|discord|\bsms\b|\btext(ed|s)?\b|en ligne|reseaux",
            ),
        ),
        (
            IncidentCategory::Discrimination,
            compile(
                r"racis|discrimin|\borigins?\b|religio|skin colou?r|couleur|\bpeau\b|handicap|disabilit|homopho|\bgay\b|sexis",
            ),
        ),
        (
            IncidentCategory::Theft,
            compile(
                r"\bstole|steal|theft|robbed|extort|racket|\bvol\b|\bvole|argent|money|\baffaires\b|belongings",
            ),
        ),
        (
            IncidentCategory::Substance,
            compile(
                r"drug|alcohol|drunk|smok|\bvap(e|ing)\b|cigarette|cannabis|\bweed\b|\bjoint\b|drogue|alcool|fumer|\bboire\b",
            ),
        ),
        (
            IncidentCategory::Threats,
            compile(r"threat|menace|intimid|scared|afraid|terrified|\bpeur\b|terreur"),
        ),
    ]
});

static DATE_HINTS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("Today", compile(r"\btoday\b|aujourd")),
        ("Yesterday", compile(r"yesterday|\bhier\b")),
        ("Last week", compile(r"last week|semaine derniere|semaine passee")),
        ("This morning", compile(r"this morning|ce matin")),
        ("This afternoon", compile(r"this afternoon|cet apres")),
    ]
});

static LOCATION_HINTS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("Playground", compile(r"playground|recess|\bcour\b|recre")),
        ("Classroom", compile(r"\bclass(room)?\b|\bclasse\b|\bsalle\b")),
        ("Hallway", compile(r"hallway|corridor|couloir")),
        ("Restrooms", compile(r"toilet|restroom|bathroom|\bwc\b")),
        ("Cafeteria", compile(r"cafeteria|canteen|lunch ?room|cantine|\bself\b")),
        ("Gym", compile(r"\bgym|\bsports?\b|\beps\b")),
        ("School exit / bus", compile(r"\bexit\b|\bgate\b|\bbus\b|sortie|portail")),
        ("Online", compile(r"online|internet|social media|en ligne|reseaux")),
    ]
});

/// Classifies free text into an incident category plus optional date and location hints.
///
/// Never fails: text that matches nothing yields [`IncidentCategory::Other`] and no hints.
pub fn classify(text: &str) -> Classification {
    let normalized = normalize(text);

    let category = CATEGORY_GROUPS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&normalized))
        .map(|(category, _)| *category)
        .unwrap_or(IncidentCategory::Other);

    Classification {
        category,
        date_hint: first_hint(&DATE_HINTS, &normalized),
        location_hint: first_hint(&LOCATION_HINTS, &normalized),
    }
}

fn first_hint(table: &[(&'static str, Regex)], normalized: &str) -> Option<String> {
    table
        .iter()
        .find(|(_, pattern)| pattern.is_match(normalized))
        .map(|(hint, _)| hint.to_string())
}
