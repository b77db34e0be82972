//! Worker pool implementation
//!
//! Workers are expensive engine-side resources, so a fixed pool is created
//! once at startup and streams share them. Each worker carries exactly one
//! router; a stream is pinned to the router it was assigned at creation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::{MediaEngine, RouterHandle, WorkerHandle, WorkerSettings};
use crate::error::{Result, SessionError};

/// One worker slot: an engine worker paired with its router
pub struct PoolWorker {
    /// Position in the pool (stable for the process lifetime)
    pub index: usize,

    /// The engine worker
    worker: Arc<dyn WorkerHandle>,

    /// The router created on this worker
    pub router: Arc<dyn RouterHandle>,
}

/// Fixed pool of engine workers with round-robin assignment
pub struct WorkerPool {
    workers: Vec<PoolWorker>,

    /// Round-robin cursor across all `next()` calls
    cursor: AtomicUsize,

    /// Set once `close_all` has run
    closed: AtomicBool,
}

impl WorkerPool {
    /// Create `count` workers, each with a paired router.
    ///
    /// Any allocation failure is fatal: the server must not start serving
    /// without its full pool.
    pub async fn create_all(
        engine: &dyn MediaEngine,
        settings: &WorkerSettings,
        count: usize,
    ) -> Result<Self> {
        if count == 0 {
            return Err(SessionError::WorkerPoolInit(
                "worker count must be at least 1".into(),
            ));
        }

        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let worker = engine
                .create_worker(settings)
                .await
                .map_err(|e| SessionError::WorkerPoolInit(format!("worker {}: {}", index, e)))?;

            let router = worker
                .create_router(&settings.media_codecs)
                .await
                .map_err(|e| SessionError::WorkerPoolInit(format!("router {}: {}", index, e)))?;

            tracing::info!(worker = index, router = %router.id(), "Worker created");

            workers.push(PoolWorker {
                index,
                worker,
                router,
            });
        }

        Ok(Self {
            workers,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the next worker in round-robin order
    pub fn next(&self) -> &PoolWorker {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }

    /// Number of workers in the pool
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close every worker handle. Idempotent.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for slot in &self.workers {
            if let Err(e) = slot.worker.close().await {
                tracing::warn!(worker = slot.index, error = %e, "Worker close failed");
            }
        }

        tracing::info!(workers = self.workers.len(), "Worker pool closed");
    }
}
