//! Reward records and the rate law
//!
//! The rate computation is a pure function of the record, the current time,
//! and the tick period, so it can be tested with synthetic clocks. The book
//! holds one record per streamer id, created lazily on the first eligible
//! tick.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Hourly rate cap: doubling stops at 64 (seventh consecutive hour)
pub const MAX_HOURLY_RATE: u64 = 64;

/// Per-streamer reward accrual state
#[derive(Debug, Clone)]
pub struct TransparencyReward {
    /// Reward added per eligible tick
    pub current_hourly_rate: u64,

    /// Consecutive eligible hours without a gap
    pub consecutive_hours: u32,

    /// When the last eligible tick ran
    pub last_active: Instant,

    /// Total accrued this session, flushed at stream close
    pub total_earned: u64,
}

impl TransparencyReward {
    /// First eligible tick: rate starts at 1 and accrues immediately
    fn start(now: Instant) -> Self {
        Self {
            current_hourly_rate: 1,
            consecutive_hours: 1,
            last_active: now,
            total_earned: 1,
        }
    }

    /// Apply one tick of the rate law.
    ///
    /// A gap longer than 1.5 tick periods resets the streak; a full period
    /// doubles the rate (capped); a shorter interval keeps the current rate.
    /// The rate is always accrued and the timestamp always advanced.
    fn accrue(&mut self, now: Instant, period: Duration) {
        let gap = now.saturating_duration_since(self.last_active);

        if gap > period + period / 2 {
            self.consecutive_hours = 1;
            self.current_hourly_rate = 1;
        } else if gap >= period {
            self.consecutive_hours += 1;
            let exponent = (self.consecutive_hours - 1).min(63);
            self.current_hourly_rate = (1u64 << exponent).min(MAX_HOURLY_RATE);
        }

        self.last_active = now;
        self.total_earned += self.current_hourly_rate;
    }
}

/// All reward records, keyed by streamer id
pub struct RewardBook {
    records: Mutex<HashMap<String, TransparencyReward>>,
}

impl RewardBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Run one tick for a streamer, creating the record on first accrual.
    ///
    /// Returns a snapshot of the record after the tick.
    pub fn accrue(&self, streamer_id: &str, now: Instant, period: Duration) -> TransparencyReward {
        let mut records = self.records.lock().expect("reward book poisoned");

        let record = records
            .entry(streamer_id.to_string())
            .and_modify(|r| r.accrue(now, period))
            .or_insert_with(|| TransparencyReward::start(now));

        record.clone()
    }

    /// Reset the in-progress rate and streak, keeping the earned total.
    ///
    /// Used when transparency is disabled mid-stream; the next eligible tick
    /// starts over at rate 1.
    pub fn reset_streak(&self, streamer_id: &str) {
        let mut records = self.records.lock().expect("reward book poisoned");

        if let Some(record) = records.get_mut(streamer_id) {
            record.consecutive_hours = 0;
            record.current_hourly_rate = 1;
        }
    }

    /// Drop any stale record for a streamer (new stream starting fresh)
    pub fn clear(&self, streamer_id: &str) {
        let mut records = self.records.lock().expect("reward book poisoned");
        records.remove(streamer_id);
    }

    /// Remove and return the record for flushing at stream close
    pub fn take(&self, streamer_id: &str) -> Option<TransparencyReward> {
        let mut records = self.records.lock().expect("reward book poisoned");
        records.remove(streamer_id)
    }

    /// Snapshot a record without mutating it
    pub fn get(&self, streamer_id: &str) -> Option<TransparencyReward> {
        let records = self.records.lock().expect("reward book poisoned");
        records.get(streamer_id).cloned()
    }
}

impl Default for RewardBook {
    fn default() -> Self {
        Self::new()
    }
}
