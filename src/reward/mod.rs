//! Transparency reward accrual
//!
//! Streamers who opt in ("transparent" streams) accrue an hourly reward
//! while actively streaming. The rate doubles for every consecutive hour of
//! uptime up to a cap, resets after a gap, and the accumulated total is
//! persisted to the external profile store when the stream closes.

pub mod ledger;
pub mod scheduler;

use async_trait::async_trait;
use thiserror::Error;

pub use ledger::{RewardBook, TransparencyReward, MAX_HOURLY_RATE};
pub use scheduler::RewardScheduler;

/// Error reported by the external profile store
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProfileStoreError(pub String);

/// External profile store the accrued total is flushed to at stream close
///
/// Failures are logged and never block stream teardown.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Add `amount` to the streamer's persisted earned-reward balance
    async fn update_earned_reward(
        &self,
        streamer_id: &str,
        amount: u64,
    ) -> std::result::Result<(), ProfileStoreError>;
}
