//! Crate-wide error types
//!
//! Per-request failures (not-found, capacity, timeouts) are converted into a
//! single `error` event at the signaling boundary and never tear down
//! unrelated streams or sockets. The only fatal error is a worker pool that
//! cannot be initialized at startup.

use thiserror::Error;

use crate::engine::EngineError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error type for session orchestration operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Registry rejected the operation (not found, duplicate, capacity, ...)
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The external media engine rejected a call
    #[error("media engine failure: {0}")]
    Engine(#[from] EngineError),

    /// An engine call did not complete within the configured bound
    #[error("media engine call timed out")]
    Timeout,

    /// The worker pool could not be initialized; the process must not serve
    #[error("worker pool initialization failed: {0}")]
    WorkerPoolInit(String),

    /// Inbound message violated the protocol (bad state, bad target, ...)
    #[error("{0}")]
    Protocol(String),

    /// JSON encoding/decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Underlying I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Short human-readable text for the `error` event sent to clients.
    ///
    /// Engine internals are not leaked; the client sees a generic failure.
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Engine(_) => "media engine error".to_string(),
            other => other.to_string(),
        }
    }
}
