//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::WorkerSettings;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Number of media-engine workers to create at startup
    pub worker_count: usize,

    /// Settings handed to the engine for each worker
    pub worker_settings: WorkerSettings,

    /// Reward accrual tick period
    pub reward_tick_period: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4443".parse().unwrap(),
            max_connections: 0, // Unlimited
            worker_count: 4,
            worker_settings: WorkerSettings::default(),
            reward_tick_period: Duration::from_secs(3600),
            tcp_nodelay: true, // Signaling replies should not sit in Nagle buffers
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the worker count
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the reward tick period
    pub fn reward_tick_period(mut self, period: Duration) -> Self {
        self.reward_tick_period = period;
        self
    }

    /// Set the engine worker settings
    pub fn worker_settings(mut self, settings: WorkerSettings) -> Self {
        self.worker_settings = settings;
        self
    }
}
