//! Error types for the protocol client
//!
//! Transport and framing failures are fatal for a session: once the stream
//! can no longer be trusted there is no safe recovery point. Request-level
//! failures only affect the call that sent the request.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the protocol client
#[derive(Error, Debug)]
pub enum Error {
    // === Startup Errors ===
    #[error("Debuggee executable not found: {}", .0.display())]
    NotFound(PathBuf),

    // === Wire Errors ===
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Request Errors ===
    #[error("Debuggee rejected request: {0}")]
    BadRequest(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // === Session Errors ===
    #[error("Debuggee process disconnected")]
    Disconnected,

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a framing error
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether the session can continue after this error.
    ///
    /// `BadRequest` and `Timeout` are scoped to a single call; everything
    /// else means the stream is no longer usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::Timeout(_))
    }
}
