//! Error types for vigil.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for vigil.
#[derive(Error, Debug)]
pub enum VigilError {
    // Stats socket errors
    #[error("Failed to connect to stats socket {path:?}: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {timeout_ms}ms talking to stats socket {path:?}")]
    SocketTimeout { path: PathBuf, timeout_ms: u64 },

    #[error("Stats socket I/O error: {0}")]
    SocketIo(#[from] std::io::Error),

    #[error("Stats socket protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Stats server returned an error: {message}")]
    Remote { message: String },

    // Collection errors
    #[error("Expected {expected} result(s) from scraper for VM {vm}, got {actual}")]
    UnexpectedResultCount { vm: String, expected: usize, actual: usize },

    #[error("No migration job info reported for VM {vm}")]
    MissingJobInfo { vm: String },

    #[error("VM lookup failed for {vm}: {reason}")]
    LookupFailed { vm: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Create a Protocol error from any displayable cause.
    pub fn protocol(reason: impl std::fmt::Display) -> Self {
        Self::Protocol { reason: reason.to_string() }
    }
}
