//! Stream, streamer, and viewer records
//!
//! This module defines the per-stream state stored in the registry: the
//! single streamer, the viewer map, and the engine handles each of them
//! owns. Closing an owner closes everything it owns; engine close failures
//! are logged and never abort the rest of a teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{ConsumerHandle, MediaKind, ProducerHandle, RouterHandle, TransportHandle};
use crate::signaling::peer::PeerSender;

/// Snapshot of one active stream for `get-streams` replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    /// Stream identity
    pub stream_id: String,
    /// Display name of the streamer
    pub streamer_name: String,
    /// Tags supplied at registration
    pub tags: Vec<String>,
    /// Displayed viewer-count hint supplied at registration
    pub viewer_count_hint: Option<u32>,
    /// Number of currently connected viewers
    pub live_viewers: u32,
}

/// The broadcaster of one stream
pub struct Streamer {
    /// Client-supplied streamer id
    pub id: String,

    /// Outbound event handle for this streamer's connection
    pub socket: PeerSender,

    /// Display name
    pub username: String,

    /// The streamer's send transport, once created
    pub transport: Option<Arc<dyn TransportHandle>>,

    /// Producers in insertion order; at most one per kind
    pub producers: Vec<Arc<dyn ProducerHandle>>,

    /// True once the first producer exists
    pub is_streaming: bool,

    /// Reward opt-in flag
    pub is_transparent: bool,

    /// Video orientation hint, relayed to viewers (opaque)
    pub orientation: Option<Value>,
}

impl Streamer {
    /// Create a new streamer record with no media state yet
    pub fn new(id: impl Into<String>, socket: PeerSender, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            socket,
            username: username.into(),
            transport: None,
            producers: Vec::new(),
            is_streaming: false,
            is_transparent: false,
            orientation: None,
        }
    }

    /// Look up the producer for a kind, if any
    pub fn producer_for(&self, kind: MediaKind) -> Option<&Arc<dyn ProducerHandle>> {
        self.producers.iter().find(|p| p.kind() == kind)
    }

    /// Store a producer, replacing a previous one of the same kind.
    ///
    /// Flips `is_streaming` on first success. Returns the replaced handle,
    /// which the caller must close outside the registry locks.
    pub fn store_producer(
        &mut self,
        producer: Arc<dyn ProducerHandle>,
    ) -> Option<Arc<dyn ProducerHandle>> {
        let kind = producer.kind();
        let replaced = match self.producers.iter().position(|p| p.kind() == kind) {
            Some(index) => {
                let old = self.producers.remove(index);
                self.producers.push(producer);
                Some(old)
            }
            None => {
                self.producers.push(producer);
                None
            }
        };

        self.is_streaming = true;
        replaced
    }

    /// Take all media handles for teardown: producers first, then transport
    pub(crate) fn take_media(
        &mut self,
    ) -> (Vec<Arc<dyn ProducerHandle>>, Option<Arc<dyn TransportHandle>>) {
        let producers = std::mem::take(&mut self.producers);
        let transport = self.transport.take();
        self.is_streaming = false;
        (producers, transport)
    }
}

/// One watcher of one stream
pub struct Viewer {
    /// Client-supplied viewer id
    pub id: String,

    /// Outbound event handle for this viewer's connection
    pub socket: PeerSender,

    /// The stream this record belongs to
    pub stream_id: String,

    /// The viewer's receive transport, once created
    pub transport: Option<Arc<dyn TransportHandle>>,

    /// Consumers on this viewer's transport, one per streamer producer
    pub consumers: Vec<Arc<dyn ConsumerHandle>>,
}

impl Viewer {
    /// Create a new viewer record with no media state yet
    pub fn new(id: impl Into<String>, socket: PeerSender, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            socket,
            stream_id: stream_id.into(),
            transport: None,
            consumers: Vec::new(),
        }
    }

    /// Look up a consumer by id
    pub fn consumer(&self, consumer_id: &str) -> Option<&Arc<dyn ConsumerHandle>> {
        self.consumers.iter().find(|c| c.id() == consumer_id)
    }

    /// Close everything this viewer owns: consumers first, then transport.
    ///
    /// Failures are logged and the remaining handles are still closed.
    pub(crate) async fn release_media(self) {
        for consumer in self.consumers {
            if let Err(e) = consumer.close().await {
                tracing::warn!(
                    stream = %self.stream_id,
                    viewer = %self.id,
                    consumer = %consumer.id(),
                    error = %e,
                    "Consumer close failed"
                );
            }
        }

        if let Some(transport) = self.transport {
            if let Err(e) = transport.close().await {
                tracing::warn!(
                    stream = %self.stream_id,
                    viewer = %self.id,
                    error = %e,
                    "Viewer transport close failed"
                );
            }
        }
    }
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    /// Stream identity (caller-supplied, unique)
    pub id: String,

    /// Pool index of the worker this stream was assigned
    pub worker_index: usize,

    /// The router assigned at creation, fixed for the stream's lifetime
    pub router: Arc<dyn RouterHandle>,

    /// The single broadcaster
    pub streamer: Streamer,

    /// Connected viewers keyed by viewer id
    pub viewers: HashMap<String, Viewer>,

    /// Tags supplied at registration
    pub tags: Vec<String>,

    /// Displayed viewer-count hint supplied at registration
    pub viewer_count_hint: Option<u32>,

    /// Whether the streamer has paused the broadcast
    pub is_paused: bool,

    /// Set while `close_stream` tears the entry down; guards late joins
    /// and tells the reward sweep to skip this entry
    pub(crate) closing: bool,

    /// When the stream was created
    pub created_at: Instant,
}

impl StreamEntry {
    /// Create a new entry for a freshly registered streamer
    pub(super) fn new(
        id: impl Into<String>,
        worker_index: usize,
        router: Arc<dyn RouterHandle>,
        streamer: Streamer,
        tags: Vec<String>,
        viewer_count_hint: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            worker_index,
            router,
            streamer,
            viewers: HashMap::new(),
            tags,
            viewer_count_hint,
            is_paused: false,
            closing: false,
            created_at: Instant::now(),
        }
    }

    /// Number of connected viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Sockets of all connected viewers
    pub fn viewer_sockets(&self) -> Vec<PeerSender> {
        self.viewers.values().map(|v| v.socket.clone()).collect()
    }

    /// Snapshot for `get-streams`
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            stream_id: self.id.clone(),
            streamer_name: self.streamer.username.clone(),
            tags: self.tags.clone(),
            viewer_count_hint: self.viewer_count_hint,
            live_viewers: self.viewers.len() as u32,
        }
    }
}
