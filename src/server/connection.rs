//! Per-connection WebSocket pump
//!
//! Each connection task owns the socket for its lifetime: it upgrades the
//! TCP stream to WebSocket, parses inbound frames into protocol messages,
//! hands them to the dispatcher, and drains the outbound event queue onto
//! the sink. Whatever way the task exits, the disconnect teardown runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::signaling::{
    ConnectionContext, InboundMessage, OutboundEvent, PeerSender, SignalingDispatcher,
};

/// Interval between server-initiated WebSocket pings
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Run one connection to completion
pub(crate) async fn run(
    socket: TcpStream,
    peer_addr: SocketAddr,
    session_id: u64,
    dispatcher: Arc<SignalingDispatcher>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(socket).await?;
    let (mut sink, mut stream) = ws.split();

    let (peer, mut outbound) = PeerSender::channel();
    let mut ctx = ConnectionContext::new(peer_addr, peer);

    let result = pump(
        &mut ctx,
        &mut sink,
        &mut stream,
        &mut outbound,
        session_id,
        &dispatcher,
    )
    .await;

    // Teardown runs on every exit path; for a streamer this ends the whole
    // stream, for a viewer it removes just that viewer.
    dispatcher.disconnect(&ctx).await;

    result
}

async fn pump<W, R>(
    ctx: &mut ConnectionContext,
    sink: &mut W,
    stream: &mut R,
    outbound: &mut tokio::sync::mpsc::UnboundedReceiver<OutboundEvent>,
    session_id: u64,
    dispatcher: &SignalingDispatcher,
) -> Result<()>
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<
            Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
        > + Unpin,
{
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    // The first interval tick fires immediately; a ping at connect time is
    // pointless, so consume it.
    keepalive.tick().await;

    loop {
        tokio::select! {
            // Outbound events (replies, fan-outs, reward updates) are
            // serialized here so ordering on the wire matches queue order.
            Some(event) = outbound.recv() => {
                let text = serde_json::to_string(&event)?;
                sink.send(Message::text(text)).await?;
            }

            _ = keepalive.tick() => {
                sink.send(Message::Ping(Bytes::new())).await?;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundMessage>(text.as_str()) {
                            Ok(message) => {
                                if let Some(reply) = dispatcher.dispatch(message, ctx).await {
                                    // Replies go through the same queue as
                                    // fan-outs to keep wire order consistent.
                                    ctx.socket.send(reply);
                                }
                            }
                            Err(e) => {
                                tracing::debug!(
                                    session_id = session_id,
                                    error = %e,
                                    "Malformed inbound message"
                                );
                                ctx.socket.send(OutboundEvent::error("malformed message"));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing in this protocol.
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = session_id, error = %e, "Socket read error");
                        return Ok(());
                    }
                }
            }
        }
    }
}
