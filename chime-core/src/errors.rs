//! Error taxonomy.
//!
//! Validation errors are reported to whoever issued the operation and are
//! never persisted. Transport failures are logged and isolated to the guild
//! they belong to. Nothing in this module represents a process-fatal
//! condition; the only unrecoverable errors are startup ones (unreadable
//! store, unusable config directory) and those stay with the daemon.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the outbound chat/voice transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("voice connect failed: {0}")]
    Connect(String),
    #[error("text send failed: {0}")]
    Send(String),
    #[error("audio playback failed: {0}")]
    Playback(String),
}

/// Persistence failures from the guild store or file projection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error returned by core operations.
#[derive(Debug, Error)]
pub enum ChimeError {
    #[error("invalid time '{0}': expected HH:mm between 00:00 and 23:59")]
    InvalidTime(String),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("trigger {index} does not exist ({len} registered)")]
    TriggerIndexOutOfRange { index: usize, len: usize },

    #[error("specify either a time or a cron expression, not both")]
    AmbiguousTimeSpec,

    #[error("a time (HH:mm) or a cron expression is required")]
    MissingTimeSpec,

    #[error("audio file '{file}' not found in {}; available: {available:?}", .dir.display())]
    AudioFileMissing {
        file: String,
        dir: PathBuf,
        available: Vec<String>,
    },

    #[error("{0}")]
    NotConnected(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}
