//! crates/speakfree_core/src/codes.rs
//!
//! Generators for the human-shareable identifiers handed out by the intake flow.

use chrono::Utc;
use rand::distributions::Uniform;
use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random part of tracking and discussion codes.
pub const CODE_BODY_LEN: usize = 9;

pub const TRACKING_PREFIX: &str = "RPT-";
pub const DISCUSSION_PREFIX: &str = "DSC-";
pub const SESSION_PREFIX: &str = "CHAT-";

fn random_body(len: usize) -> String {
    let dist = Uniform::from(0..ALPHABET.len());
    rand::thread_rng()
        .sample_iter(dist)
        .take(len)
        .map(|i| ALPHABET[i] as char)
        .collect()
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let d = (value % 36) as u8;
        let digit = if d < 10 { b'0' + d } else { b'A' + (d - 10) };
        digits.push(digit as char);
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// A report tracking code such as `RPT-7Q2K9XW1B`.
pub fn tracking_code() -> String {
    format!("{TRACKING_PREFIX}{}", random_body(CODE_BODY_LEN))
}

/// A discussion code such as `DSC-M3T0PZ8QA`.
pub fn discussion_code() -> String {
    format!("{DISCUSSION_PREFIX}{}", random_body(CODE_BODY_LEN))
}

/// An opaque session token: `CHAT-<base36 millis>-<6 random chars>`.
pub fn session_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("{SESSION_PREFIX}{}-{}", to_base36(millis), random_body(6))
}

/// Upper-cases a user supplied code so lookups are case-insensitive.
pub fn canonical(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
