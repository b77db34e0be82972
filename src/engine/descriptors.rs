//! Plain-data types exchanged with the media engine and relayed to clients
//!
//! Descriptors carry the connection material a client needs to set up its
//! side of a transport, producer, or consumer. Their payloads (ICE servers,
//! DTLS fingerprints, RTP parameters) are opaque JSON to this layer.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Connection parameters for a freshly created WebRTC transport
///
/// Relayed to the client so it can complete ICE/DTLS negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    /// Engine-assigned transport id
    pub id: String,
    /// ICE parameters (opaque)
    pub ice_parameters: Value,
    /// ICE candidates (opaque)
    pub ice_candidates: Value,
    /// DTLS parameters (opaque)
    pub dtls_parameters: Value,
}

/// Descriptor for a producer created on the streamer's transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerDescriptor {
    /// Engine-assigned producer id
    pub id: String,
    /// Track kind
    pub kind: MediaKind,
}

/// Descriptor for a consumer created on a viewer's transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    /// Engine-assigned consumer id
    pub id: String,
    /// The producer this consumer forwards
    pub producer_id: String,
    /// Track kind
    pub kind: MediaKind,
    /// RTP parameters the client needs to receive the track (opaque)
    pub rtp_parameters: Value,
    /// Engine consumer type (e.g. "simple", "simulcast")
    #[serde(rename = "type")]
    pub consumer_type: String,
}

/// Static network options handed to the engine when creating transports
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// IPs the engine should listen on for ICE
    pub listen_ips: Vec<IpAddr>,
    /// Allow UDP candidates
    pub enable_udp: bool,
    /// Allow TCP candidates
    pub enable_tcp: bool,
    /// Initial outgoing bitrate hint in bps
    pub initial_available_outgoing_bitrate: Option<u32>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            listen_ips: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
            enable_udp: true,
            enable_tcp: true,
            initial_available_outgoing_bitrate: Some(1_000_000),
        }
    }
}

/// Static settings for engine workers and their routers
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Lowest RTC port the worker may use
    pub rtc_min_port: u16,
    /// Highest RTC port the worker may use
    pub rtc_max_port: u16,
    /// Router codec configuration (opaque, engine-defined shape)
    pub media_codecs: Vec<Value>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            media_codecs: Vec::new(),
        }
    }
}
