//! Test support: scripted mock engine and recording profile store
//!
//! The mock engine hands out deterministic ids (`t0`, `p1`, `c2`, ...) and
//! can be told to fail or stall specific call families, which is how the
//! timeout and engine-failure paths get exercised without a real SFU.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::{
    ConsumerDescriptor, ConsumerHandle, EngineError, EngineResult, MediaEngine, MediaKind,
    ProducerHandle, RouterHandle, TransportDescriptor, TransportHandle, WorkerHandle,
    WorkerSettings,
};
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::reward::{ProfileStore, ProfileStoreError};
use crate::worker::WorkerPool;

#[derive(Default)]
struct MockState {
    ids: AtomicU64,
    fail_workers: AtomicBool,
    fail_transports: AtomicBool,
    stall_connects: AtomicBool,
    closed_workers: AtomicUsize,
    producer_kinds: Mutex<HashMap<String, MediaKind>>,
    resumed_consumers: Mutex<HashSet<String>>,
}

impl MockState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.ids.fetch_add(1, Ordering::Relaxed))
    }
}

/// Scripted in-memory media engine
#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    state: Arc<MockState>,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `create_worker` fail from now on
    pub(crate) fn fail_workers(&self) {
        self.state.fail_workers.store(true, Ordering::SeqCst);
    }

    /// Make `create_webrtc_transport` fail from now on
    pub(crate) fn fail_transports(&self) {
        self.state.fail_transports.store(true, Ordering::SeqCst);
    }

    /// Make `transport.connect` hang forever from now on
    pub(crate) fn stall_connects(&self) {
        self.state.stall_connects.store(true, Ordering::SeqCst);
    }

    /// How many workers have been closed
    pub(crate) fn closed_workers(&self) -> usize {
        self.state.closed_workers.load(Ordering::SeqCst)
    }

    /// Whether a consumer has been resumed
    pub(crate) fn consumer_resumed(&self, consumer_id: &str) -> bool {
        self.state
            .resumed_consumers
            .lock()
            .unwrap()
            .contains(consumer_id)
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_worker(
        &self,
        _settings: &WorkerSettings,
    ) -> EngineResult<Arc<dyn WorkerHandle>> {
        if self.state.fail_workers.load(Ordering::SeqCst) {
            return Err(EngineError::new("mock worker allocation refused"));
        }

        Ok(Arc::new(MockWorker {
            state: Arc::clone(&self.state),
        }) as Arc<dyn WorkerHandle>)
    }
}

struct MockWorker {
    state: Arc<MockState>,
}

#[async_trait]
impl WorkerHandle for MockWorker {
    async fn create_router(&self, _media_codecs: &[Value]) -> EngineResult<Arc<dyn RouterHandle>> {
        Ok(Arc::new(MockRouter {
            id: self.state.next_id("router"),
            state: Arc::clone(&self.state),
        }) as Arc<dyn RouterHandle>)
    }

    async fn close(&self) -> EngineResult<()> {
        self.state.closed_workers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockRouter {
    id: String,
    state: Arc<MockState>,
}

#[async_trait]
impl RouterHandle for MockRouter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn rtp_capabilities(&self) -> Value {
        json!({ "codecs": [], "headerExtensions": [] })
    }

    async fn create_webrtc_transport(
        &self,
        _options: &crate::engine::TransportOptions,
    ) -> EngineResult<Arc<dyn TransportHandle>> {
        if self.state.fail_transports.load(Ordering::SeqCst) {
            return Err(EngineError::new("mock transport allocation refused"));
        }

        Ok(Arc::new(MockTransport {
            id: self.state.next_id("t"),
            state: Arc::clone(&self.state),
        }) as Arc<dyn TransportHandle>)
    }
}

struct MockTransport {
    id: String,
    state: Arc<MockState>,
}

#[async_trait]
impl TransportHandle for MockTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            id: self.id.clone(),
            ice_parameters: json!({}),
            ice_candidates: json!([]),
            dtls_parameters: json!({}),
        }
    }

    async fn connect(&self, _dtls_parameters: Value) -> EngineResult<()> {
        if self.state.stall_connects.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: Value,
    ) -> EngineResult<Arc<dyn ProducerHandle>> {
        let id = self.state.next_id("p");
        self.state
            .producer_kinds
            .lock()
            .unwrap()
            .insert(id.clone(), kind);

        Ok(Arc::new(MockProducer { id, kind }) as Arc<dyn ProducerHandle>)
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: Value,
        _paused: bool,
    ) -> EngineResult<Arc<dyn ConsumerHandle>> {
        let kind = self
            .state
            .producer_kinds
            .lock()
            .unwrap()
            .get(producer_id)
            .copied()
            .ok_or_else(|| EngineError::new("unknown producer"))?;

        Ok(Arc::new(MockConsumer {
            id: self.state.next_id("c"),
            producer_id: producer_id.to_string(),
            kind,
            state: Arc::clone(&self.state),
        }) as Arc<dyn ConsumerHandle>)
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Standalone mock producer, also constructible directly for record tests
pub(crate) struct MockProducer {
    id: String,
    kind: MediaKind,
}

impl MockProducer {
    pub(crate) fn handle(id: &str, kind: MediaKind) -> Arc<dyn ProducerHandle> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
        })
    }
}

#[async_trait]
impl ProducerHandle for MockProducer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    state: Arc<MockState>,
}

#[async_trait]
impl ConsumerHandle for MockConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn descriptor(&self) -> ConsumerDescriptor {
        ConsumerDescriptor {
            id: self.id.clone(),
            producer_id: self.producer_id.clone(),
            kind: self.kind,
            rtp_parameters: json!({}),
            consumer_type: "simple".to_string(),
        }
    }

    async fn resume(&self) -> EngineResult<()> {
        self.state
            .resumed_consumers
            .lock()
            .unwrap()
            .insert(self.id.clone());
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Profile store that records reward flushes
#[derive(Default)]
pub(crate) struct RecordingProfileStore {
    updates: Mutex<Vec<(String, u64)>>,
    fail: AtomicBool,
}

impl RecordingProfileStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All `(streamer_id, amount)` flushes so far
    pub(crate) fn updates(&self) -> Vec<(String, u64)> {
        self.updates.lock().unwrap().clone()
    }

    /// Make every update fail from now on
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileStore for RecordingProfileStore {
    async fn update_earned_reward(
        &self,
        streamer_id: &str,
        amount: u64,
    ) -> std::result::Result<(), ProfileStoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProfileStoreError("mock profile store refused".into()));
        }

        self.updates
            .lock()
            .unwrap()
            .push((streamer_id.to_string(), amount));
        Ok(())
    }
}

/// Everything a registry-level test needs
pub(crate) struct TestContext {
    pub registry: Arc<StreamRegistry>,
    pub engine: MockEngine,
    pub profiles: Arc<RecordingProfileStore>,
}

/// Build a registry over a mock engine pool with default config
pub(crate) async fn test_registry(workers: usize) -> TestContext {
    test_registry_with(workers, RegistryConfig::default()).await
}

/// Build a registry over a mock engine pool with custom config
pub(crate) async fn test_registry_with(workers: usize, config: RegistryConfig) -> TestContext {
    let engine = MockEngine::new();
    let pool = Arc::new(
        WorkerPool::create_all(&engine, &WorkerSettings::default(), workers)
            .await
            .expect("mock pool"),
    );
    let profiles = RecordingProfileStore::new();
    let registry = Arc::new(StreamRegistry::new(
        pool,
        Arc::clone(&profiles) as Arc<dyn ProfileStore>,
        config,
    ));

    TestContext {
        registry,
        engine,
        profiles,
    }
}
