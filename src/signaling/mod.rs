//! Signaling layer: wire protocol, peer handles, and the dispatcher
//!
//! Inbound socket frames are validated into typed messages at the protocol
//! boundary, dispatched against the registry, and answered with exactly one
//! reply event plus whatever fan-out the message implies for the stream's
//! other participants.

pub mod dispatcher;
pub mod message;
pub mod peer;

pub use dispatcher::{ConnectionContext, SignalingDispatcher};
pub use message::{ChatMessage, InboundMessage, OutboundEvent};
pub use peer::{ClientRole, ConnectionPhase, PeerSender};
