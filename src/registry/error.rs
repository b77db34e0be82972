//! Registry error types
//!
//! Error types for stream registry and transport ledger operations. All of
//! these are per-request failures surfaced to the offending client as an
//! `error` event; none of them are fatal.

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Stream not found
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// A stream with this id is already live
    #[error("stream already exists: {0}")]
    DuplicateStream(String),

    /// Viewer not found on the target stream
    #[error("viewer not found: {0}")]
    ViewerNotFound(String),

    /// Transport id does not match the stored handle
    #[error("transport not found: {0}")]
    TransportNotFound(String),

    /// Viewer is already watching the maximum number of streams
    #[error("viewer {viewer_id} already watching {limit} streams")]
    CapacityExceeded {
        /// The viewer that hit the limit
        viewer_id: String,
        /// The configured watch limit
        limit: u32,
    },

    /// Consume attempted before the streamer produced any media
    #[error("stream {0} has no producers yet")]
    NoProducers(String),
}
