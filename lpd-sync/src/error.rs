//! Error types for the sync engine
//!
//! `SyncError` is `Clone`: the outcome of one debounced selection write is
//! delivered to every toggle of the burst that produced it.

use thiserror::Error;

/// Sync engine error type
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// Remote answered with a non-success HTTP status
    #[error("Transport error: HTTP {status}")]
    Transport { status: u16 },

    /// Request never produced a response (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Catalog payload is structurally invalid
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    /// Selections could not be loaded at startup
    #[error("Selection load failed: {0}")]
    SelectionLoad(String),

    /// Selection persistence failed after all retries
    #[error("Storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// Remote accepted the request but reported failure
    #[error("Server rejected request: {0}")]
    Rejected(String),

    /// Caller supplied an invalid value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persisted payload does not match its checksum
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Work was cancelled by teardown before it ran
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be used
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SyncError::Transport {
                status: status.as_u16(),
            },
            None => SyncError::Network(err.to_string()),
        }
    }
}

impl From<lpd_common::Error> for SyncError {
    fn from(err: lpd_common::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

/// Convenience Result type using the sync engine error
pub type Result<T> = std::result::Result<T, SyncError>;
