//! Registry configuration

use std::time::Duration;

use crate::engine::TransportOptions;

/// Configuration for the stream registry and transport ledger
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of streams one viewer id may watch concurrently
    pub max_watched_streams: u32,

    /// Bound on every call into the external media engine
    pub engine_call_timeout: Duration,

    /// Static network options for WebRTC transports
    pub transport_options: TransportOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_watched_streams: 4,
            engine_call_timeout: Duration::from_secs(5),
            transport_options: TransportOptions::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the per-viewer concurrent watch limit
    pub fn max_watched_streams(mut self, limit: u32) -> Self {
        self.max_watched_streams = limit;
        self
    }

    /// Set the engine call timeout
    pub fn engine_call_timeout(mut self, timeout: Duration) -> Self {
        self.engine_call_timeout = timeout;
        self
    }

    /// Set the transport network options
    pub fn transport_options(mut self, options: TransportOptions) -> Self {
        self.transport_options = options;
        self
    }
}
