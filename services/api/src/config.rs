//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use speakfree_core::domain::{School, SchoolStatus};
use speakfree_core::uploads::DEFAULT_MAX_UPLOAD_BYTES;
use speakfree_core::IntakeSettings;
use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where reports, sessions and schools are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    /// Everything lives in process memory; schools come from `SEED_SCHOOLS`.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub backend: StorageBackend,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub max_attachments: usize,
    pub min_narrative_chars: usize,
    pub session_idle_ttl_secs: u64,
    pub completed_session_ttl_secs: u64,
    pub janitor_interval_secs: u64,
    pub cors_origin: String,
    pub seed_schools: Vec<School>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Storage ---
        let backend = match lookup("STORAGE_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("postgres") => StorageBackend::Postgres {
                database_url: lookup("DATABASE_URL")
                    .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            },
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        let seed_schools = match lookup("SEED_SCHOOLS") {
            Some(raw) => parse_seed_schools(&raw)?,
            None => Vec::new(),
        };

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads/reports"));

        // --- Intake tuning ---
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", Some(DEFAULT_MAX_UPLOAD_BYTES))?;
        let max_attachments = parse_or(&lookup, "MAX_ATTACHMENTS", Some(10))?;
        let min_narrative_chars = parse_or(&lookup, "MIN_NARRATIVE_CHARS", Some(10))?;
        let session_idle_ttl_secs = parse_or(&lookup, "SESSION_IDLE_TTL_SECS", Some(7200))?;
        let completed_session_ttl_secs =
            parse_or(&lookup, "COMPLETED_SESSION_TTL_SECS", Some(60))?;
        let janitor_interval_secs = parse_or(&lookup, "JANITOR_INTERVAL_SECS", Some(30))?;
        if janitor_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "JANITOR_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            backend,
            log_level,
            upload_dir,
            max_upload_bytes,
            max_attachments,
            min_narrative_chars,
            session_idle_ttl_secs,
            completed_session_ttl_secs,
            janitor_interval_secs,
            cors_origin,
            seed_schools,
        })
    }

    pub fn intake_settings(&self) -> IntakeSettings {
        IntakeSettings {
            min_narrative_chars: self.min_narrative_chars,
            max_attachments: self.max_attachments,
            idle_ttl: Duration::seconds(self.session_idle_ttl_secs as i64),
            completed_ttl: Duration::seconds(self.completed_session_ttl_secs as i64),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

/// Parses `CODE:Name:status` entries separated by commas. The status defaults to active.
fn parse_seed_schools(raw: &str) -> Result<Vec<School>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("SEED_SCHOOLS".to_string(), msg);

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':').map(str::trim);
            let code = parts.next().filter(|c| !c.is_empty());
            let name = parts.next().filter(|n| !n.is_empty());
            let (Some(code), Some(name)) = (code, name) else {
                return Err(invalid(format!("'{}' is not CODE:Name[:status]", entry)));
            };
            let status = match parts.next() {
                None => SchoolStatus::Active,
                Some(s) => SchoolStatus::parse(s)
                    .ok_or_else(|| invalid(format!("'{}' is not a school status", s)))?,
            };
            Ok(School {
                id: Uuid::new_v4(),
                code: code.to_string(),
                name: name.to_string(),
                status,
            })
        })
        .collect()
}
