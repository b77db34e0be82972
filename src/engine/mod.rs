//! Media-engine capability interface
//!
//! The orchestrator never touches RTP/SRTP/ICE/DTLS itself. Everything
//! media-plane lives behind the traits in this module: an implementation
//! wraps a real SFU engine (workers, routers, WebRTC transports, producers,
//! consumers) and the rest of the crate only ever sees opaque handles and
//! plain-data descriptors that are relayed to clients verbatim.
//!
//! ICE/DTLS/RTP material is deliberately kept as `serde_json::Value` — this
//! layer forwards it between engine and client without interpreting it.

pub mod api;
pub mod descriptors;

pub use api::{
    ConsumerHandle, EngineError, EngineResult, MediaEngine, ProducerHandle, RouterHandle,
    TransportHandle, WorkerHandle,
};
pub use descriptors::{
    ConsumerDescriptor, MediaKind, ProducerDescriptor, TransportDescriptor, TransportOptions,
    WorkerSettings,
};
