//! Reward scheduler
//!
//! A periodic sweep over all active streams. Streams whose streamer is both
//! transparent and actively streaming accrue one tick of reward and get a
//! `reward-update` pushed to their socket. Failures are per-stream: a
//! vanished stream or a dead socket never stops the rest of the sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::registry::StreamRegistry;
use crate::signaling::message::OutboundEvent;

/// Periodic reward sweep over the registry
pub struct RewardScheduler {
    registry: Arc<StreamRegistry>,

    /// Tick period; one hour in production
    period: Duration,
}

impl RewardScheduler {
    /// Create a scheduler ticking at the given period
    pub fn new(registry: Arc<StreamRegistry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Run one sweep with the current time
    pub async fn sweep_once(&self) {
        self.sweep_at(Instant::now()).await;
    }

    /// Run one sweep with an explicit clock (tests drive synthetic times)
    pub(crate) async fn sweep_at(&self, now: Instant) {
        let entries = self.registry.entries().await;
        let mut accrued = 0usize;

        for entry_arc in entries {
            // The stream may close between the snapshot and this read; a
            // closing entry is simply skipped.
            let entry = entry_arc.read().await;
            if entry.closing || !entry.streamer.is_transparent || !entry.streamer.is_streaming {
                continue;
            }

            let record = self
                .registry
                .reward_book()
                .accrue(&entry.streamer.id, now, self.period);
            accrued += 1;

            let delivered = entry.streamer.socket.send(OutboundEvent::RewardUpdate {
                hourly_rate: record.current_hourly_rate,
                consecutive_hours: record.consecutive_hours,
                total_earned: record.total_earned,
            });

            if !delivered {
                tracing::warn!(
                    stream = %entry.id,
                    streamer = %entry.streamer.id,
                    "Reward update not delivered, socket closed"
                );
            }
        }

        tracing::debug!(streams = accrued, "Reward sweep complete");
    }

    /// Spawn the periodic sweep task
    ///
    /// Returns a handle that can be used to abort the task on shutdown;
    /// a sweep in flight finishes its sends best-effort.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so streams only
            // accrue after a full period of uptime.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::MediaKind;
    use crate::signaling::peer::PeerSender;
    use crate::testing::test_registry;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn transparent_streaming_stream(
        ctx: &crate::testing::TestContext,
        stream_id: &str,
        streamer_id: &str,
    ) -> tokio::sync::mpsc::UnboundedReceiver<OutboundEvent> {
        let (socket, rx) = PeerSender::channel();
        ctx.registry
            .create_stream(stream_id, streamer_id, socket, streamer_id, Vec::new(), None)
            .await
            .unwrap();

        let transport = ctx
            .registry
            .create_streamer_transport(stream_id)
            .await
            .unwrap();
        ctx.registry
            .produce(stream_id, &transport.id, MediaKind::Video, json!({}))
            .await
            .unwrap();
        ctx.registry
            .set_transparency(stream_id, true)
            .await
            .unwrap();

        rx
    }

    #[tokio::test]
    async fn test_sweep_accrues_for_eligible_streams() {
        let ctx = test_registry(1).await;
        let mut rx = transparent_streaming_stream(&ctx, "st1", "s1").await;

        let scheduler = RewardScheduler::new(Arc::clone(&ctx.registry), HOUR);
        let t0 = Instant::now();

        scheduler.sweep_at(t0).await;
        scheduler.sweep_at(t0 + HOUR).await;

        let record = ctx.registry.reward_book().get("s1").unwrap();
        assert_eq!(record.total_earned, 3);

        // Both ticks pushed an update to the streamer's socket.
        match rx.try_recv().unwrap() {
            OutboundEvent::RewardUpdate {
                hourly_rate,
                total_earned,
                ..
            } => {
                assert_eq!(hourly_rate, 1);
                assert_eq!(total_earned, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            OutboundEvent::RewardUpdate { hourly_rate, .. } => assert_eq!(hourly_rate, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_skips_opaque_and_idle_streams() {
        let ctx = test_registry(1).await;

        // Not transparent, not streaming.
        let (socket, _rx) = PeerSender::channel();
        ctx.registry
            .create_stream("st1", "s1", socket, "s1", Vec::new(), None)
            .await
            .unwrap();

        // Transparent but never produced.
        let (socket, _rx2) = PeerSender::channel();
        ctx.registry
            .create_stream("st2", "s2", socket, "s2", Vec::new(), None)
            .await
            .unwrap();
        ctx.registry.set_transparency("st2", true).await.unwrap();

        let scheduler = RewardScheduler::new(Arc::clone(&ctx.registry), HOUR);
        scheduler.sweep_once().await;

        assert!(ctx.registry.reward_book().get("s1").is_none());
        assert!(ctx.registry.reward_book().get("s2").is_none());
    }

    #[tokio::test]
    async fn test_sweep_survives_dead_socket() {
        let ctx = test_registry(1).await;

        let rx = transparent_streaming_stream(&ctx, "st1", "s1").await;
        drop(rx); // Streamer's connection is gone.
        let _rx2 = transparent_streaming_stream(&ctx, "st2", "s2").await;

        let scheduler = RewardScheduler::new(Arc::clone(&ctx.registry), HOUR);
        scheduler.sweep_once().await;

        // Both streams accrued despite the first delivery failing.
        assert_eq!(ctx.registry.reward_book().get("s1").unwrap().total_earned, 1);
        assert_eq!(ctx.registry.reward_book().get("s2").unwrap().total_earned, 1);
    }
}
