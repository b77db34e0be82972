//! Media-engine worker pool
//!
//! A fixed set of engine workers, each paired with one router, created at
//! process start and handed out round-robin to new streams.

pub mod pool;

pub use pool::{PoolWorker, WorkerPool};
