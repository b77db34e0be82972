//! Stream registry implementation
//!
//! The central registry that manages all active streams, their streamer and
//! viewer records, and the global per-viewer watch counts. With no
//! persistence layer behind it, all correctness comes from the in-memory
//! invariants enforced here and from the strict teardown ordering in
//! `close_stream`: viewers first, then producers, then the streamer
//! transport, and only then the registry entry itself.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<StreamRegistry>
//!                ┌───────────────────────────────┐
//!                │ streams: HashMap<StreamId,    │
//!                │   StreamEntry {               │
//!                │     streamer, viewers,        │
//!                │     router,                   │
//!                │   }                           │
//!                │ >                             │
//!                │ watching: HashMap<ViewerId,n> │
//!                └───────────────┬───────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!      [Dispatcher]       [TransportLedger]   [RewardScheduler]
//!      register/close     produce/consume     hourly sweep
//! ```
//!
//! The `watching` map, not the per-stream viewer maps, is authoritative for
//! the concurrent-watch capacity check.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::record::{StreamEntry, StreamSummary, Streamer, Viewer};
use crate::error::Result;
use crate::reward::{ProfileStore, RewardBook};
use crate::signaling::peer::PeerSender;
use crate::worker::WorkerPool;

/// What a successful viewer registration hands back to the dispatcher
pub struct ViewerAdmission {
    /// The streamer's socket, for the `viewer-joined` notification
    pub streamer_socket: PeerSender,
    /// Whether the stream is currently paused (late joiners get told)
    pub stream_paused: bool,
    /// Current orientation hint, relayed to late joiners
    pub orientation: Option<Value>,
}

/// Central registry for all active streams
pub struct StreamRegistry {
    /// Map of stream id to stream entry
    streams: RwLock<HashMap<String, Arc<RwLock<StreamEntry>>>>,

    /// Global watch counts per viewer id; authoritative for capacity checks
    watching: RwLock<HashMap<String, u32>>,

    /// Per-streamer transparency reward records
    rewards: RewardBook,

    /// Worker pool streams draw their router from
    pool: Arc<WorkerPool>,

    /// External profile store for reward persistence at stream close
    profiles: Arc<dyn ProfileStore>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new registry backed by the given worker pool
    pub fn new(
        pool: Arc<WorkerPool>,
        profiles: Arc<dyn ProfileStore>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            watching: RwLock::new(HashMap::new()),
            rewards: RewardBook::new(),
            pool,
            profiles,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the transparency reward book
    pub fn reward_book(&self) -> &RewardBook {
        &self.rewards
    }

    /// Register a new stream for a streamer.
    ///
    /// Assigns the next worker's router round-robin and clears any stale
    /// reward record left behind for this streamer id.
    pub async fn create_stream(
        &self,
        stream_id: &str,
        streamer_id: &str,
        socket: PeerSender,
        username: &str,
        tags: Vec<String>,
        viewer_count_hint: Option<u32>,
    ) -> Result<()> {
        let mut streams = self.streams.write().await;

        if streams.contains_key(stream_id) {
            return Err(RegistryError::DuplicateStream(stream_id.to_string()).into());
        }

        let worker = self.pool.next();
        self.rewards.clear(streamer_id);

        let streamer = Streamer::new(streamer_id, socket, username);
        let entry = StreamEntry::new(
            stream_id,
            worker.index,
            Arc::clone(&worker.router),
            streamer,
            tags,
            viewer_count_hint,
        );

        streams.insert(stream_id.to_string(), Arc::new(RwLock::new(entry)));

        tracing::info!(
            stream = %stream_id,
            streamer = %streamer_id,
            worker = worker.index,
            "Stream created"
        );

        Ok(())
    }

    /// Add a viewer to a stream.
    ///
    /// The global watch-count map is checked and incremented here; a viewer
    /// id may hold records in at most `max_watched_streams` streams at once.
    /// Re-registering a viewer already on this stream replaces the old
    /// record without double-counting.
    pub async fn add_viewer(
        &self,
        stream_id: &str,
        viewer_id: &str,
        socket: PeerSender,
    ) -> Result<ViewerAdmission> {
        let entry_arc = self.entry(stream_id).await?;
        let mut entry = entry_arc.write().await;

        if entry.closing {
            return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
        }

        let replaced = entry.viewers.remove(viewer_id);

        if replaced.is_none() {
            let mut watching = self.watching.write().await;
            let count = watching.get(viewer_id).copied().unwrap_or(0);

            if count >= self.config.max_watched_streams {
                return Err(RegistryError::CapacityExceeded {
                    viewer_id: viewer_id.to_string(),
                    limit: self.config.max_watched_streams,
                }
                .into());
            }

            watching.insert(viewer_id.to_string(), count + 1);
        }

        entry.viewers.insert(
            viewer_id.to_string(),
            Viewer::new(viewer_id, socket, stream_id),
        );

        let admission = ViewerAdmission {
            streamer_socket: entry.streamer.socket.clone(),
            stream_paused: entry.is_paused,
            orientation: entry.streamer.orientation.clone(),
        };

        tracing::info!(
            stream = %stream_id,
            viewer = %viewer_id,
            viewers = entry.viewer_count(),
            "Viewer added"
        );

        drop(entry);

        if let Some(old) = replaced {
            old.release_media().await;
        }

        Ok(admission)
    }

    /// Remove a viewer from a stream.
    ///
    /// No-op if the stream or viewer is absent. Closes the viewer's
    /// consumers and transport, then decrements the global watch count
    /// (never below zero).
    pub async fn remove_viewer(&self, stream_id: &str, viewer_id: &str) {
        let entry_arc = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        };

        let Some(entry_arc) = entry_arc else {
            return;
        };

        let removed = entry_arc.write().await.viewers.remove(viewer_id);

        let Some(viewer) = removed else {
            return;
        };

        viewer.release_media().await;

        let mut watching = self.watching.write().await;
        if let Some(count) = watching.get_mut(viewer_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                watching.remove(viewer_id);
            }
        }

        tracing::info!(stream = %stream_id, viewer = %viewer_id, "Viewer removed");
    }

    /// Close a stream and tear down everything it owns.
    ///
    /// No-op if absent. Order is mandatory: flush the reward record, remove
    /// every viewer, close the streamer's producers, close the streamer's
    /// transport, delete the entry. Each step is attempted even when an
    /// earlier one failed.
    pub async fn close_stream(&self, stream_id: &str) {
        let entry_arc = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        };

        let Some(entry_arc) = entry_arc else {
            return;
        };

        let (streamer_id, viewer_ids) = {
            let mut entry = entry_arc.write().await;
            if entry.closing {
                return;
            }
            entry.closing = true;
            (
                entry.streamer.id.clone(),
                entry.viewers.keys().cloned().collect::<Vec<_>>(),
            )
        };

        // Reward persistence is best-effort; teardown continues regardless.
        if let Some(reward) = self.rewards.take(&streamer_id) {
            if let Err(e) = self
                .profiles
                .update_earned_reward(&streamer_id, reward.total_earned)
                .await
            {
                tracing::warn!(
                    stream = %stream_id,
                    streamer = %streamer_id,
                    total_earned = reward.total_earned,
                    error = %e,
                    "Reward persistence failed"
                );
            }
        }

        for viewer_id in viewer_ids {
            self.remove_viewer(stream_id, &viewer_id).await;
        }

        let (producers, transport) = entry_arc.write().await.streamer.take_media();

        for producer in producers {
            if let Err(e) = producer.close().await {
                tracing::warn!(
                    stream = %stream_id,
                    producer = %producer.id(),
                    error = %e,
                    "Producer close failed"
                );
            }
        }

        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                tracing::warn!(
                    stream = %stream_id,
                    error = %e,
                    "Streamer transport close failed"
                );
            }
        }

        self.streams.write().await.remove(stream_id);

        tracing::info!(stream = %stream_id, streamer = %streamer_id, "Stream closed");
    }

    /// Close every stream. Used on shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = {
            let streams = self.streams.read().await;
            streams.keys().cloned().collect()
        };

        for stream_id in ids {
            self.close_stream(&stream_id).await;
        }
    }

    /// Snapshot of all live streams. No mutation.
    pub async fn active_streams(&self) -> Vec<StreamSummary> {
        let streams = self.streams.read().await;
        let mut summaries = Vec::with_capacity(streams.len());

        for entry_arc in streams.values() {
            let entry = entry_arc.read().await;
            if !entry.closing {
                summaries.push(entry.summary());
            }
        }

        summaries
    }

    /// Toggle the streamer's transparency (reward opt-in) flag.
    ///
    /// Disabling resets the in-progress rate and streak but keeps the total
    /// already earned.
    pub async fn set_transparency(&self, stream_id: &str, enabled: bool) -> Result<()> {
        let entry_arc = self.entry(stream_id).await?;
        let mut entry = entry_arc.write().await;

        entry.streamer.is_transparent = enabled;

        if !enabled {
            self.rewards.reset_streak(&entry.streamer.id);
        }

        tracing::debug!(stream = %stream_id, enabled, "Transparency toggled");
        Ok(())
    }

    /// Set or clear the stream's paused flag
    pub async fn set_paused(&self, stream_id: &str, paused: bool) -> Result<()> {
        let entry_arc = self.entry(stream_id).await?;
        entry_arc.write().await.is_paused = paused;
        Ok(())
    }

    /// Store the streamer's video orientation hint
    pub async fn set_orientation(&self, stream_id: &str, orientation: Value) -> Result<()> {
        let entry_arc = self.entry(stream_id).await?;
        entry_arc.write().await.streamer.orientation = Some(orientation);
        Ok(())
    }

    /// RTP capabilities of the stream's router
    pub async fn rtp_capabilities(&self, stream_id: &str) -> Result<Value> {
        let entry_arc = self.entry(stream_id).await?;
        let entry = entry_arc.read().await;
        Ok(entry.router.rtp_capabilities())
    }

    /// The streamer's socket, if the stream exists
    pub async fn streamer_socket(&self, stream_id: &str) -> Option<PeerSender> {
        let entry_arc = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        }?;
        let entry = entry_arc.read().await;
        Some(entry.streamer.socket.clone())
    }

    /// Sockets of every viewer on the stream
    pub async fn viewer_sockets(&self, stream_id: &str) -> Vec<PeerSender> {
        let entry_arc = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        };

        match entry_arc {
            Some(entry_arc) => entry_arc.read().await.viewer_sockets(),
            None => Vec::new(),
        }
    }

    /// Current global watch count for a viewer id
    pub async fn watch_count(&self, viewer_id: &str) -> u32 {
        let watching = self.watching.read().await;
        watching.get(viewer_id).copied().unwrap_or(0)
    }

    /// Total number of live streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Look up a stream entry, failing with `StreamNotFound`
    pub(crate) async fn entry(
        &self,
        stream_id: &str,
    ) -> std::result::Result<Arc<RwLock<StreamEntry>>, RegistryError> {
        let streams = self.streams.read().await;
        streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))
    }

    /// Snapshot of all entries, for the reward sweep
    pub(crate) async fn entries(&self) -> Vec<Arc<RwLock<StreamEntry>>> {
        let streams = self.streams.read().await;
        streams.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::testing::{test_registry, TestContext};

    fn peer() -> PeerSender {
        let (socket, rx) = PeerSender::channel();
        // Keep the receiver alive for the duration of the test.
        std::mem::forget(rx);
        socket
    }

    async fn create_stream(ctx: &TestContext, stream_id: &str, streamer_id: &str) {
        ctx.registry
            .create_stream(stream_id, streamer_id, peer(), streamer_id, Vec::new(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_stream_rejected() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;

        let result = ctx
            .registry
            .create_stream("st1", "s2", peer(), "s2", Vec::new(), None)
            .await;

        assert!(matches!(
            result,
            Err(SessionError::Registry(RegistryError::DuplicateStream(_)))
        ));
    }

    #[tokio::test]
    async fn test_worker_assignment_cycles() {
        let ctx = test_registry(2).await;

        create_stream(&ctx, "a", "s1").await;
        create_stream(&ctx, "b", "s2").await;
        create_stream(&ctx, "c", "s3").await;

        let mut indices = Vec::new();
        for id in ["a", "b", "c"] {
            let entry_arc = ctx.registry.entry(id).await.unwrap();
            indices.push(entry_arc.read().await.worker_index);
        }

        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn test_viewer_capacity_limit() {
        let ctx = test_registry(2).await;

        for i in 0..5 {
            create_stream(&ctx, &format!("st{}", i), &format!("s{}", i)).await;
        }

        for i in 0..4 {
            ctx.registry
                .add_viewer(&format!("st{}", i), "v1", peer())
                .await
                .unwrap();
        }

        assert_eq!(ctx.registry.watch_count("v1").await, 4);

        // Fifth concurrent watch is rejected and adds no entry.
        let result = ctx.registry.add_viewer("st4", "v1", peer()).await;
        assert!(matches!(
            result,
            Err(SessionError::Registry(
                RegistryError::CapacityExceeded { .. }
            ))
        ));
        assert_eq!(ctx.registry.watch_count("v1").await, 4);

        let entry_arc = ctx.registry.entry("st4").await.unwrap();
        assert_eq!(entry_arc.read().await.viewer_count(), 0);
    }

    #[tokio::test]
    async fn test_add_viewer_unknown_stream() {
        let ctx = test_registry(2).await;

        let result = ctx.registry.add_viewer("nope", "v1", peer()).await;
        assert!(matches!(
            result,
            Err(SessionError::Registry(RegistryError::StreamNotFound(_)))
        ));
        assert_eq!(ctx.registry.watch_count("v1").await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_same_stream_does_not_double_count() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;

        ctx.registry.add_viewer("st1", "v1", peer()).await.unwrap();
        ctx.registry.add_viewer("st1", "v1", peer()).await.unwrap();

        assert_eq!(ctx.registry.watch_count("v1").await, 1);

        let entry_arc = ctx.registry.entry("st1").await.unwrap();
        assert_eq!(entry_arc.read().await.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_viewer_idempotent() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;
        ctx.registry.add_viewer("st1", "v1", peer()).await.unwrap();

        ctx.registry.remove_viewer("st1", "v1").await;
        assert_eq!(ctx.registry.watch_count("v1").await, 0);

        // Second removal is a no-op and never goes negative.
        ctx.registry.remove_viewer("st1", "v1").await;
        assert_eq!(ctx.registry.watch_count("v1").await, 0);
    }

    #[tokio::test]
    async fn test_close_stream_removes_everything() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;
        create_stream(&ctx, "st2", "s2").await;

        ctx.registry.add_viewer("st1", "v1", peer()).await.unwrap();
        ctx.registry.add_viewer("st2", "v1", peer()).await.unwrap();
        ctx.registry.add_viewer("st1", "v2", peer()).await.unwrap();

        ctx.registry.close_stream("st1").await;

        let listed = ctx.registry.active_streams().await;
        assert!(listed.iter().all(|s| s.stream_id != "st1"));

        // Each former viewer's count dropped by exactly one.
        assert_eq!(ctx.registry.watch_count("v1").await, 1);
        assert_eq!(ctx.registry.watch_count("v2").await, 0);

        // Closing again is a no-op.
        ctx.registry.close_stream("st1").await;
        assert_eq!(ctx.registry.stream_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_stream_persists_reward() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;

        let now = std::time::Instant::now();
        let period = std::time::Duration::from_secs(3600);
        ctx.registry.reward_book().accrue("s1", now, period);
        ctx.registry.reward_book().accrue("s1", now + period, period);

        ctx.registry.close_stream("st1").await;

        assert_eq!(ctx.profiles.updates(), vec![("s1".to_string(), 3)]);
        assert!(ctx.registry.reward_book().get("s1").is_none());
    }

    #[tokio::test]
    async fn test_reward_persistence_failure_does_not_block_teardown() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;

        let now = std::time::Instant::now();
        ctx.registry
            .reward_book()
            .accrue("s1", now, std::time::Duration::from_secs(3600));
        ctx.profiles.fail();

        ctx.registry.close_stream("st1").await;

        assert_eq!(ctx.registry.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_stream_clears_stale_reward() {
        let ctx = test_registry(2).await;

        let now = std::time::Instant::now();
        ctx.registry
            .reward_book()
            .accrue("s1", now, std::time::Duration::from_secs(3600));

        create_stream(&ctx, "st1", "s1").await;

        assert!(ctx.registry.reward_book().get("s1").is_none());
    }

    #[tokio::test]
    async fn test_transparency_disable_resets_streak() {
        let ctx = test_registry(2).await;
        create_stream(&ctx, "st1", "s1").await;

        let now = std::time::Instant::now();
        let period = std::time::Duration::from_secs(3600);
        ctx.registry.reward_book().accrue("s1", now, period);
        ctx.registry.reward_book().accrue("s1", now + period, period);

        ctx.registry.set_transparency("st1", false).await.unwrap();

        let record = ctx.registry.reward_book().get("s1").unwrap();
        assert_eq!(record.consecutive_hours, 0);
        assert_eq!(record.total_earned, 3); // total survives the reset
    }

    #[tokio::test]
    async fn test_active_streams_snapshot() {
        let ctx = test_registry(2).await;
        ctx.registry
            .create_stream(
                "st1",
                "s1",
                peer(),
                "alice",
                vec!["music".to_string()],
                Some(250),
            )
            .await
            .unwrap();
        ctx.registry.add_viewer("st1", "v1", peer()).await.unwrap();

        let listed = ctx.registry.active_streams().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].stream_id, "st1");
        assert_eq!(listed[0].streamer_name, "alice");
        assert_eq!(listed[0].tags, vec!["music".to_string()]);
        assert_eq!(listed[0].viewer_count_hint, Some(250));
        assert_eq!(listed[0].live_viewers, 1);
    }
}
