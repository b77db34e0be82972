//! # stagecast
//!
//! A WebRTC live-stream session orchestrator: one streamer broadcasts to
//! many viewers per stream, media flows through an external SFU engine, and
//! this crate keeps the books. It tracks streams, streamers, viewers, and
//! their transport/producer/consumer handles, enforces capacity and
//! lifecycle invariants, drives signaling over WebSocket, and accrues
//! transparency rewards for opted-in streamers.
//!
//! There is no persistence layer behind the registry; all session-state
//! correctness comes from in-memory invariants and strict teardown ordering.
//!
//! ## Modules
//!
//! - [`engine`]: capability traits for the external media engine (consumed,
//!   never reimplemented) and the descriptors relayed to clients
//! - [`worker`]: fixed pool of engine workers, assigned round-robin
//! - [`registry`]: the authoritative map of live streams, viewers, and
//!   their engine handles
//! - [`reward`]: transparency reward accrual and the hourly sweep
//! - [`signaling`]: JSON wire protocol and the message dispatcher
//! - [`server`]: WebSocket accept loop and per-connection pumps
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stagecast::{RegistryConfig, ServerConfig, SignalServer};
//!
//! let server = SignalServer::new(
//!     ServerConfig::default(),
//!     engine,   // Arc<dyn MediaEngine>
//!     profiles, // Arc<dyn ProfileStore>
//!     RegistryConfig::default(),
//! )
//! .await?;
//!
//! server.run_until(shutdown_signal()).await?;
//! ```

pub mod engine;
pub mod error;
pub mod registry;
pub mod reward;
pub mod server;
pub mod signaling;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, SessionError};
pub use registry::{RegistryConfig, RegistryError, StreamRegistry};
pub use server::{ServerConfig, SignalServer};
pub use signaling::{ClientRole, SignalingDispatcher};
pub use worker::WorkerPool;
