//! services/api/src/lib.rs
//!
//! The HTTP service around the SpeakFree intake engine: configuration, persistence
//! adapters and the Axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
