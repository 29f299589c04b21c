//! crates/speakfree_core/src/uploads.rs
//!
//! Validation rules for evidence files attached during intake.

use std::path::Path;

/// Extensions accepted as evidence: pictures, short videos and PDFs.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "mp4", "mov", "avi", "webm", "pdf",
];

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("the file has no name")]
    MissingName,
    #[error("files of type '{0}' are not accepted")]
    UnsupportedType(String),
    #[error("the file is empty")]
    Empty,
    #[error("the file is {size} bytes, the limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Checks a file before it is written. Returns the lower-cased extension.
    pub fn validate(&self, original_name: &str, size: u64) -> Result<String, UploadRejection> {
        if original_name.trim().is_empty() {
            return Err(UploadRejection::MissingName);
        }
        let extension = extension_of(original_name)
            .ok_or_else(|| UploadRejection::UnsupportedType(String::new()))?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(UploadRejection::UnsupportedType(extension));
        }
        if size == 0 {
            return Err(UploadRejection::Empty);
        }
        if size > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(extension)
    }
}

pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Best-effort MIME type for an accepted extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
