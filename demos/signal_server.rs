//! Signaling server demo with a loopback media engine
//!
//! Run with: cargo run --example signal_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example signal_server                  # binds to 0.0.0.0:4443
//!   cargo run --example signal_server localhost        # binds to 127.0.0.1:4443
//!   cargo run --example signal_server 127.0.0.1:4444   # binds to 127.0.0.1:4444
//!
//! The loopback engine fabricates transport/producer/consumer handles
//! without moving any media, so the full signaling flow can be driven with
//! a WebSocket client:
//!
//!   {"event":"register","data":{"id":"s1","clientType":"streamer","streamId":"demo","username":"alice"}}
//!   {"event":"create-transport","data":{"streamId":"demo","isStreamer":true}}
//!   {"event":"produce","data":{"streamId":"demo","transportId":"t0","kind":"video","rtpParameters":{}}}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use stagecast::engine::{
    ConsumerDescriptor, ConsumerHandle, EngineResult, MediaEngine, MediaKind, ProducerHandle,
    RouterHandle, TransportDescriptor, TransportHandle, TransportOptions, WorkerHandle,
    WorkerSettings,
};
use stagecast::reward::{ProfileStore, ProfileStoreError};
use stagecast::{RegistryConfig, ServerConfig, SignalServer};

/// Engine that fabricates handles without touching any media
#[derive(Default)]
struct LoopbackEngine {
    ids: Arc<AtomicU64>,
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn create_worker(
        &self,
        _settings: &WorkerSettings,
    ) -> EngineResult<Arc<dyn WorkerHandle>> {
        Ok(Arc::new(LoopbackWorker {
            ids: Arc::clone(&self.ids),
        }) as Arc<dyn WorkerHandle>)
    }
}

struct LoopbackWorker {
    ids: Arc<AtomicU64>,
}

#[async_trait]
impl WorkerHandle for LoopbackWorker {
    async fn create_router(&self, _media_codecs: &[Value]) -> EngineResult<Arc<dyn RouterHandle>> {
        let id = format!("router{}", self.ids.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(LoopbackRouter {
            id,
            ids: Arc::clone(&self.ids),
        }) as Arc<dyn RouterHandle>)
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

struct LoopbackRouter {
    id: String,
    ids: Arc<AtomicU64>,
}

#[async_trait]
impl RouterHandle for LoopbackRouter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn rtp_capabilities(&self) -> Value {
        json!({ "codecs": [], "headerExtensions": [] })
    }

    async fn create_webrtc_transport(
        &self,
        _options: &TransportOptions,
    ) -> EngineResult<Arc<dyn TransportHandle>> {
        let id = format!("t{}", self.ids.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(LoopbackTransport {
            id,
            ids: Arc::clone(&self.ids),
        }) as Arc<dyn TransportHandle>)
    }
}

struct LoopbackTransport {
    id: String,
    ids: Arc<AtomicU64>,
}

#[async_trait]
impl TransportHandle for LoopbackTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            id: self.id.clone(),
            ice_parameters: json!({"usernameFragment": "demo", "password": "demo"}),
            ice_candidates: json!([]),
            dtls_parameters: json!({"fingerprints": []}),
        }
    }

    async fn connect(&self, _dtls_parameters: Value) -> EngineResult<()> {
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: Value,
    ) -> EngineResult<Arc<dyn ProducerHandle>> {
        let id = format!("p{}", self.ids.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(LoopbackProducer { id, kind }) as Arc<dyn ProducerHandle>)
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: Value,
        _paused: bool,
    ) -> EngineResult<Arc<dyn ConsumerHandle>> {
        let id = format!("c{}", self.ids.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(LoopbackConsumer {
            id,
            producer_id: producer_id.to_string(),
        }) as Arc<dyn ConsumerHandle>)
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

struct LoopbackProducer {
    id: String,
    kind: MediaKind,
}

#[async_trait]
impl ProducerHandle for LoopbackProducer {
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

struct LoopbackConsumer {
    id: String,
    producer_id: String,
}

#[async_trait]
impl ConsumerHandle for LoopbackConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn descriptor(&self) -> ConsumerDescriptor {
        ConsumerDescriptor {
            id: self.id.clone(),
            producer_id: self.producer_id.clone(),
            kind: MediaKind::Video,
            rtp_parameters: json!({}),
            consumer_type: "simple".to_string(),
        }
    }

    async fn resume(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Profile store that just logs reward flushes
struct LoggingProfileStore;

#[async_trait]
impl ProfileStore for LoggingProfileStore {
    async fn update_earned_reward(
        &self,
        streamer_id: &str,
        amount: u64,
    ) -> Result<(), ProfileStoreError> {
        println!("Reward flush: streamer={} amount={}", streamer_id, amount);
        Ok(())
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:4443
/// - "127.0.0.1" -> 127.0.0.1:4443
/// - "127.0.0.1:4444" -> 127.0.0.1:4444
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 4443;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: signal_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:4443)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:4443".parse().unwrap(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stagecast=debug".parse()?)
                .add_directive("signal_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig {
        bind_addr,
        worker_count: 2,
        ..ServerConfig::default()
    };

    println!("Starting signaling server on {}", config.bind_addr);
    println!();
    println!("Connect a WebSocket client and register:");
    println!("  {{\"event\":\"register\",\"data\":{{\"id\":\"s1\",\"clientType\":\"streamer\",\"streamId\":\"demo\",\"username\":\"alice\"}}}}");
    println!();

    let server = SignalServer::new(
        config,
        Arc::new(LoopbackEngine::default()),
        Arc::new(LoggingProfileStore),
        RegistryConfig::default(),
    )
    .await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
