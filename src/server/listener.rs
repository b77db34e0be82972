//! Signaling server listener
//!
//! Handles the TCP accept loop, upgrades connections to WebSocket, and
//! spawns one connection task per client. Owns the worker pool, registry,
//! and reward scheduler for the process lifetime; shutdown closes every
//! stream and then the pool across all exit paths.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::engine::MediaEngine;
use crate::error::Result;
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::reward::{ProfileStore, RewardScheduler};
use crate::server::config::ServerConfig;
use crate::server::connection;
use crate::signaling::SignalingDispatcher;
use crate::worker::WorkerPool;

/// WebRTC signaling server
pub struct SignalServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    dispatcher: Arc<SignalingDispatcher>,
    pool: Arc<WorkerPool>,
    scheduler: Arc<RewardScheduler>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SignalServer {
    /// Create a server, allocating the full worker pool up front.
    ///
    /// Pool allocation failure is fatal: the server is never constructed
    /// half-initialized.
    pub async fn new(
        config: ServerConfig,
        engine: Arc<dyn MediaEngine>,
        profiles: Arc<dyn ProfileStore>,
        registry_config: RegistryConfig,
    ) -> Result<Self> {
        let pool = Arc::new(
            WorkerPool::create_all(engine.as_ref(), &config.worker_settings, config.worker_count)
                .await?,
        );

        let registry = Arc::new(StreamRegistry::new(
            Arc::clone(&pool),
            profiles,
            registry_config,
        ));

        let dispatcher = Arc::new(SignalingDispatcher::new(Arc::clone(&registry)));
        let scheduler = Arc::new(RewardScheduler::new(
            Arc::clone(&registry),
            config.reward_tick_period,
        ));

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            registry,
            dispatcher,
            pool,
            scheduler,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server until the shutdown future resolves.
    ///
    /// On shutdown every stream is closed (flushing rewards) and the worker
    /// pool is released, regardless of how the accept loop exited.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Signaling server listening");

        let reward_handle = Arc::clone(&self.scheduler).spawn();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        reward_handle.abort();
        self.registry.close_all().await;
        self.pool.close_all().await;

        result
    }

    /// Run the server forever
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            // Held for the life of the connection task.
            let _permit = permit;

            if let Err(e) = connection::run(socket, peer_addr, session_id, dispatcher).await {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
