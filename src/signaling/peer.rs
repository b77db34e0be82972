//! Peer handles and per-connection state
//!
//! The opaque "socket" the registry stores for streamers and viewers is a
//! `PeerSender`: a cloneable handle onto the connection's outbound event
//! queue. The connection's write pump drains the queue onto the WebSocket,
//! so registry code and background tasks can push events without ever
//! touching the transport.

use tokio::sync::mpsc;

use serde::{Deserialize, Serialize};

use super::message::OutboundEvent;

/// Role a client registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// The single broadcaster of a stream
    Streamer,
    /// One of many watchers of a stream
    Viewer,
}

impl std::fmt::Display for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientRole::Streamer => write!(f, "streamer"),
            ClientRole::Viewer => write!(f, "viewer"),
        }
    }
}

/// Cloneable handle for pushing events to one connected peer
#[derive(Debug, Clone)]
pub struct PeerSender {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl PeerSender {
    /// Create a sender together with the receiving end the write pump drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event for delivery.
    ///
    /// Returns false if the peer is gone (connection task exited). Callers
    /// treat that as a delivery failure to log, never as an error to
    /// propagate.
    pub fn send(&self, event: OutboundEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the peer's connection is still draining events
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Lifecycle of one signaling connection
///
/// A connection starts `Unregistered`; only a valid `register` message moves
/// it to `Registered`. Every other message is rejected until then.
#[derive(Debug, Clone)]
pub enum ConnectionPhase {
    /// Connected, no register message accepted yet
    Unregistered,
    /// Registered as a streamer or viewer of one stream
    Registered {
        /// The client-supplied id
        client_id: String,
        /// Streamer or viewer
        role: ClientRole,
        /// The stream this connection is bound to
        stream_id: String,
    },
}

impl ConnectionPhase {
    /// Whether the connection has completed registration
    pub fn is_registered(&self) -> bool {
        matches!(self, ConnectionPhase::Registered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_sender_delivery() {
        let (peer, mut rx) = PeerSender::channel();

        assert!(peer.is_open());
        assert!(peer.send(OutboundEvent::StreamEnded {
            stream_id: "st1".into()
        }));

        match rx.try_recv().unwrap() {
            OutboundEvent::StreamEnded { stream_id } => assert_eq!(stream_id, "st1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_peer_sender_closed() {
        let (peer, rx) = PeerSender::channel();
        drop(rx);

        assert!(!peer.is_open());
        assert!(!peer.send(OutboundEvent::StreamEnded {
            stream_id: "st1".into()
        }));
    }

    #[test]
    fn test_phase_transitions() {
        let phase = ConnectionPhase::Unregistered;
        assert!(!phase.is_registered());

        let phase = ConnectionPhase::Registered {
            client_id: "v1".into(),
            role: ClientRole::Viewer,
            stream_id: "st1".into(),
        };
        assert!(phase.is_registered());
    }
}
