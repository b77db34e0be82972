//! Signaling wire protocol
//!
//! Every frame on the socket is a JSON envelope `{event, data}`. Inbound and
//! outbound messages are modeled as tagged unions validated at this boundary;
//! nothing duck-typed crosses into the dispatch layer. Event names are
//! kebab-case, payload keys camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::peer::ClientRole;
use crate::engine::{ConsumerDescriptor, MediaKind, ProducerDescriptor, TransportDescriptor};
use crate::registry::StreamSummary;

/// A chat message relayed verbatim between the participants of a stream
///
/// Signature verification happens client-side against the sender's public
/// key; this layer only fans the message out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Target stream
    pub stream_id: String,
    /// Sender's client id
    pub sender_id: String,
    /// Message body
    pub message: String,
    /// Client-supplied timestamp (milliseconds since epoch)
    pub timestamp: i64,
    /// Detached signature over the message
    pub signature: String,
    /// Sender's public key
    pub public_key: String,
}

/// Messages received from a connected client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum InboundMessage {
    /// Bind this connection to a stream as streamer or viewer
    Register {
        /// Client id (streamer id or viewer id depending on role)
        id: String,
        /// Which role the client registers as
        client_type: ClientRole,
        /// Target stream
        stream_id: String,
        /// Streamer id, when a viewer names the stream owner
        #[serde(default, skip_serializing_if = "Option::is_none")]
        streamer_id: Option<String>,
        /// Display name (streamers)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Stream tags (streamers)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
        /// Displayed viewer-count hint (streamers)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewer_count: Option<u32>,
    },

    /// List all live streams
    GetStreams {},

    /// Fetch the RTP capabilities of a stream's router
    GetRtpCapabilities { stream_id: String },

    /// Create a WebRTC transport for this client
    CreateTransport {
        stream_id: String,
        #[serde(default)]
        is_streamer: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        streamer_id: Option<String>,
    },

    /// Complete DTLS setup on a previously created transport
    ConnectTransport {
        stream_id: String,
        transport_id: String,
        dtls_parameters: Value,
        #[serde(default)]
        is_streamer: bool,
    },

    /// Start sending a track (streamer only)
    Produce {
        stream_id: String,
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: Value,
    },

    /// Consume every producer of the stream (viewer only)
    Consume {
        stream_id: String,
        transport_id: String,
        rtp_capabilities: Value,
    },

    /// Resume a paused consumer
    ResumeConsumer {
        stream_id: String,
        consumer_id: String,
    },

    /// End the broadcast (streamer only)
    EndStream { stream_id: String },

    /// Pause the broadcast (streamer only)
    PauseStream { stream_id: String },

    /// Resume the broadcast (streamer only)
    ResumeStream { stream_id: String },

    /// Update the video orientation hint (streamer only)
    ChangeOrientation { stream_id: String, orientation: Value },

    /// Opt in or out of transparency rewards (streamer only)
    SetTransparency { stream_id: String, enabled: bool },

    /// Relay a chat message to the stream's participants
    ChatMessage(ChatMessage),
}

/// Events sent to connected clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum OutboundEvent {
    /// Registration accepted
    Registered {
        stream_id: String,
        client_type: ClientRole,
    },

    /// Reply to `get-streams`
    Streams { streams: Vec<StreamSummary> },

    /// Reply to `get-rtp-capabilities`
    RtpCapabilities { rtp_capabilities: Value },

    /// Reply to `create-transport`
    TransportCreated { transport: TransportDescriptor },

    /// Reply to `connect-transport`
    TransportConnected { transport_id: String },

    /// Reply to `produce`
    Produced { producer: ProducerDescriptor },

    /// Reply to `consume`: one descriptor per streamer producer
    Consumed { consumer: Vec<ConsumerDescriptor> },

    /// Reply to `resume-consumer`
    ConsumerResumed { consumer_id: String },

    /// A viewer joined the stream (to the streamer)
    ViewerJoined { stream_id: String, viewer_id: String },

    /// A viewer left the stream (to the streamer)
    ViewerLeft { stream_id: String, viewer_id: String },

    /// The stream ended (to all viewers)
    StreamEnded { stream_id: String },

    /// The broadcast paused (echo + to all viewers)
    StreamPaused { stream_id: String },

    /// The broadcast resumed (echo + to all viewers)
    StreamResumed { stream_id: String },

    /// The streamer's video orientation changed (to all viewers)
    OrientationChanged { stream_id: String, orientation: Value },

    /// Reply to `set-transparency`
    TransparencySet { stream_id: String, enabled: bool },

    /// Chat relay (to streamer and all viewers)
    ChatMessage(ChatMessage),

    /// Reward accrual update (to the streamer)
    RewardUpdate {
        hourly_rate: u64,
        consecutive_hours: u32,
        total_earned: u64,
    },

    /// Request failed; `message` is short and human-readable
    Error { message: String },
}

impl OutboundEvent {
    /// Build an `error` event
    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
        }
    }
}
