//! Engine handle traits
//!
//! One trait per engine-side object. Handles are shared as `Arc<dyn ...>`
//! so registry records can hold them while calls are awaited outside the
//! registry locks. `close` is best-effort everywhere: a failing close is
//! logged by the caller and never aborts a teardown pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::descriptors::{
    ConsumerDescriptor, MediaKind, TransportDescriptor, TransportOptions, WorkerSettings,
};

/// Error reported by the external media engine
///
/// The engine's failure detail is opaque to the orchestrator; it is logged
/// with context and surfaced to clients as a generic error.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    /// Create an engine error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result alias for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Entry point into the external media engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Allocate a new worker process/thread in the engine
    async fn create_worker(&self, settings: &WorkerSettings) -> EngineResult<Arc<dyn WorkerHandle>>;
}

/// A media-engine worker
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    /// Create a router on this worker with the given codec configuration
    async fn create_router(&self, media_codecs: &[Value]) -> EngineResult<Arc<dyn RouterHandle>>;

    /// Close the worker and everything it owns
    async fn close(&self) -> EngineResult<()>;
}

/// A router: routes media between the transports of one stream
#[async_trait]
pub trait RouterHandle: Send + Sync {
    /// Engine-assigned router id
    fn id(&self) -> String;

    /// RTP capabilities clients need before producing/consuming (opaque)
    fn rtp_capabilities(&self) -> Value;

    /// Create a WebRTC transport on this router
    async fn create_webrtc_transport(
        &self,
        options: &TransportOptions,
    ) -> EngineResult<Arc<dyn TransportHandle>>;
}

/// A negotiated ICE/DTLS session carrying RTP
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Engine-assigned transport id
    fn id(&self) -> String;

    /// Connection parameters to relay to the client
    fn descriptor(&self) -> TransportDescriptor;

    /// Complete DTLS setup with the client's parameters
    async fn connect(&self, dtls_parameters: Value) -> EngineResult<()>;

    /// Start sending a media track into the engine (streamer side)
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> EngineResult<Arc<dyn ProducerHandle>>;

    /// Start forwarding a producer to this transport (viewer side)
    ///
    /// Consumers are created paused; the client resumes them once its side
    /// is wired up.
    async fn consume(
        &self,
        producer_id: &str,
        rtp_capabilities: Value,
        paused: bool,
    ) -> EngineResult<Arc<dyn ConsumerHandle>>;

    /// Close the transport and everything it owns
    async fn close(&self) -> EngineResult<()>;
}

/// A media track being sent into the engine by the streamer
#[async_trait]
pub trait ProducerHandle: Send + Sync {
    /// Engine-assigned producer id
    fn id(&self) -> String;

    /// Track kind
    fn kind(&self) -> MediaKind;

    /// Close the producer
    async fn close(&self) -> EngineResult<()>;
}

/// A forwarded copy of a producer delivered to one viewer's transport
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    /// Engine-assigned consumer id
    fn id(&self) -> String;

    /// Track kind
    fn kind(&self) -> MediaKind;

    /// Descriptor to relay to the consuming client
    fn descriptor(&self) -> ConsumerDescriptor;

    /// Resume a paused consumer
    async fn resume(&self) -> EngineResult<()>;

    /// Close the consumer
    async fn close(&self) -> EngineResult<()>;
}
