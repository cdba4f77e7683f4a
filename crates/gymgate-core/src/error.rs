//! Core error types for gymgate-core.
//!
//! Everything below the `CoreError` umbrella is recoverable at the
//! session boundary; nothing here should terminate the hosting process.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::{SessionId, Stage};

/// Core error type for gymgate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session state machine errors
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage-related errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by verification session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Event arrived for a stage where it has no effect; session unchanged.
    #[error("event ignored: no effect in stage '{stage}'")]
    IgnoredWrongStage { stage: Stage },

    /// Location verification attempted with no home location configured.
    #[error("home location is not configured")]
    ConfigurationMissing,

    /// No session with the given id.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load settings
    #[error("failed to load settings from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save settings
    #[error("failed to save settings to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid settings value
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown settings key
    #[error("unknown settings key: {0}")]
    UnknownKey(String),

    /// Malformed time-of-day string
    #[error("invalid time '{0}': expected HH:MM")]
    InvalidTime(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the session database
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("database is locked")]
    Locked,

    /// Persisted record could not be decoded
    #[error("corrupt persisted record under '{key}': {message}")]
    CorruptRecord { key: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
