//! Signaling dispatcher
//!
//! Routes validated inbound messages to registry and ledger operations.
//! Every connection starts unregistered; a valid `register` binds it to one
//! stream as streamer or viewer, and everything else is rejected until then.
//! Each message produces exactly one reply to the requesting socket (or
//! none, where the protocol says so) plus fan-out notifications to the other
//! participants of the stream. All failures are caught here and converted to
//! a single `error` event; nothing propagates to unrelated sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use super::message::{ChatMessage, InboundMessage, OutboundEvent};
use super::peer::{ClientRole, ConnectionPhase, PeerSender};
use crate::error::{Result, SessionError};
use crate::registry::StreamRegistry;

/// Per-connection context owned by the connection task
pub struct ConnectionContext {
    /// Remote peer address, for logging
    pub peer_addr: SocketAddr,

    /// Outbound handle for this connection
    pub socket: PeerSender,

    /// Registration state machine
    pub phase: ConnectionPhase,
}

impl ConnectionContext {
    /// Create a fresh, unregistered context
    pub fn new(peer_addr: SocketAddr, socket: PeerSender) -> Self {
        Self {
            peer_addr,
            socket,
            phase: ConnectionPhase::Unregistered,
        }
    }
}

/// Central message dispatcher
pub struct SignalingDispatcher {
    registry: Arc<StreamRegistry>,
}

impl SignalingDispatcher {
    /// Create a dispatcher over the given registry
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    /// Process one inbound message.
    ///
    /// Returns the reply event for the requesting socket, or `None` for
    /// messages that have no direct reply (`end-stream`, `chat-message`).
    pub async fn dispatch(
        &self,
        message: InboundMessage,
        ctx: &mut ConnectionContext,
    ) -> Option<OutboundEvent> {
        if matches!(message, InboundMessage::Register { .. }) {
            return Some(self.handle_register(message, ctx).await);
        }

        let ConnectionPhase::Registered {
            client_id,
            role,
            stream_id,
        } = ctx.phase.clone()
        else {
            return Some(OutboundEvent::error("not registered"));
        };

        match self
            .dispatch_registered(message, &client_id, role, &stream_id)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    client = %client_id,
                    error = %e,
                    "Request failed"
                );
                Some(OutboundEvent::error(e.client_message()))
            }
        }
    }

    /// Handle the one message type allowed while unregistered
    async fn handle_register(
        &self,
        message: InboundMessage,
        ctx: &mut ConnectionContext,
    ) -> OutboundEvent {
        let InboundMessage::Register {
            id,
            client_type,
            stream_id,
            username,
            tags,
            viewer_count,
            ..
        } = message
        else {
            return OutboundEvent::error("invalid register payload");
        };

        if ctx.phase.is_registered() {
            return OutboundEvent::error("already registered");
        }

        match client_type {
            ClientRole::Streamer => {
                let username = username.unwrap_or_else(|| id.clone());
                if let Err(e) = self
                    .registry
                    .create_stream(
                        &stream_id,
                        &id,
                        ctx.socket.clone(),
                        &username,
                        tags,
                        viewer_count,
                    )
                    .await
                {
                    return OutboundEvent::error(e.client_message());
                }
            }
            ClientRole::Viewer => {
                let admission = match self
                    .registry
                    .add_viewer(&stream_id, &id, ctx.socket.clone())
                    .await
                {
                    Ok(admission) => admission,
                    Err(e) => return OutboundEvent::error(e.client_message()),
                };

                admission.streamer_socket.send(OutboundEvent::ViewerJoined {
                    stream_id: stream_id.clone(),
                    viewer_id: id.clone(),
                });

                // Late joiners get told when the broadcast is paused and
                // which way the video is currently oriented.
                if admission.stream_paused {
                    ctx.socket.send(OutboundEvent::StreamPaused {
                        stream_id: stream_id.clone(),
                    });
                }
                if let Some(orientation) = admission.orientation {
                    ctx.socket.send(OutboundEvent::OrientationChanged {
                        stream_id: stream_id.clone(),
                        orientation,
                    });
                }
            }
        }

        ctx.phase = ConnectionPhase::Registered {
            client_id: id,
            role: client_type,
            stream_id: stream_id.clone(),
        };

        tracing::info!(
            peer = %ctx.peer_addr,
            stream = %stream_id,
            role = %client_type,
            "Client registered"
        );

        OutboundEvent::Registered {
            stream_id,
            client_type,
        }
    }

    /// Route messages from a registered connection
    async fn dispatch_registered(
        &self,
        message: InboundMessage,
        client_id: &str,
        role: ClientRole,
        bound_stream: &str,
    ) -> Result<Option<OutboundEvent>> {
        match message {
            // ---------------------------------------------------------------
            // Read-only queries
            // ---------------------------------------------------------------
            InboundMessage::GetStreams {} => Ok(Some(OutboundEvent::Streams {
                streams: self.registry.active_streams().await,
            })),

            InboundMessage::GetRtpCapabilities { stream_id } => {
                let rtp_capabilities = self.registry.rtp_capabilities(&stream_id).await?;
                Ok(Some(OutboundEvent::RtpCapabilities { rtp_capabilities }))
            }

            // ---------------------------------------------------------------
            // Transport setup
            // ---------------------------------------------------------------
            InboundMessage::CreateTransport { stream_id, .. } => {
                self.check_binding(&stream_id, bound_stream)?;

                let transport = match role {
                    ClientRole::Streamer => {
                        self.registry.create_streamer_transport(&stream_id).await?
                    }
                    ClientRole::Viewer => {
                        self.registry
                            .create_viewer_transport(&stream_id, client_id)
                            .await?
                    }
                };

                Ok(Some(OutboundEvent::TransportCreated { transport }))
            }

            InboundMessage::ConnectTransport {
                stream_id,
                transport_id,
                dtls_parameters,
                ..
            } => {
                self.check_binding(&stream_id, bound_stream)?;

                match role {
                    ClientRole::Streamer => {
                        self.registry
                            .connect_streamer_transport(&stream_id, &transport_id, dtls_parameters)
                            .await?
                    }
                    ClientRole::Viewer => {
                        self.registry
                            .connect_viewer_transport(
                                &stream_id,
                                client_id,
                                &transport_id,
                                dtls_parameters,
                            )
                            .await?
                    }
                }

                Ok(Some(OutboundEvent::TransportConnected { transport_id }))
            }

            // ---------------------------------------------------------------
            // Media
            // ---------------------------------------------------------------
            InboundMessage::Produce {
                stream_id,
                transport_id,
                kind,
                rtp_parameters,
            } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "produce")?;

                let producer = self
                    .registry
                    .produce(&stream_id, &transport_id, kind, rtp_parameters)
                    .await?;

                Ok(Some(OutboundEvent::Produced { producer }))
            }

            InboundMessage::Consume {
                stream_id,
                transport_id,
                rtp_capabilities,
            } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Viewer, "consume")?;

                let consumer = self
                    .registry
                    .consume(&stream_id, client_id, &transport_id, rtp_capabilities)
                    .await?;

                Ok(Some(OutboundEvent::Consumed { consumer }))
            }

            InboundMessage::ResumeConsumer {
                stream_id,
                consumer_id,
            } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Viewer, "resume-consumer")?;

                self.registry
                    .resume_consumer(&stream_id, client_id, &consumer_id)
                    .await?;

                Ok(Some(OutboundEvent::ConsumerResumed { consumer_id }))
            }

            // ---------------------------------------------------------------
            // Stream lifecycle (streamer only)
            // ---------------------------------------------------------------
            InboundMessage::EndStream { stream_id } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "end-stream")?;

                let viewers = self.registry.viewer_sockets(&stream_id).await;
                self.registry.close_stream(&stream_id).await;

                for socket in viewers {
                    socket.send(OutboundEvent::StreamEnded {
                        stream_id: stream_id.clone(),
                    });
                }

                Ok(None)
            }

            InboundMessage::PauseStream { stream_id } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "pause-stream")?;

                self.registry.set_paused(&stream_id, true).await?;
                self.fanout_to_viewers(&stream_id, |id| OutboundEvent::StreamPaused {
                    stream_id: id,
                })
                .await;

                Ok(Some(OutboundEvent::StreamPaused { stream_id }))
            }

            InboundMessage::ResumeStream { stream_id } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "resume-stream")?;

                self.registry.set_paused(&stream_id, false).await?;
                self.fanout_to_viewers(&stream_id, |id| OutboundEvent::StreamResumed {
                    stream_id: id,
                })
                .await;

                Ok(Some(OutboundEvent::StreamResumed { stream_id }))
            }

            InboundMessage::ChangeOrientation {
                stream_id,
                orientation,
            } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "change-orientation")?;

                self.registry
                    .set_orientation(&stream_id, orientation.clone())
                    .await?;

                for socket in self.registry.viewer_sockets(&stream_id).await {
                    socket.send(OutboundEvent::OrientationChanged {
                        stream_id: stream_id.clone(),
                        orientation: orientation.clone(),
                    });
                }

                Ok(Some(OutboundEvent::OrientationChanged {
                    stream_id,
                    orientation,
                }))
            }

            InboundMessage::SetTransparency { stream_id, enabled } => {
                self.check_binding(&stream_id, bound_stream)?;
                self.check_role(role, ClientRole::Streamer, "set-transparency")?;

                self.registry.set_transparency(&stream_id, enabled).await?;

                Ok(Some(OutboundEvent::TransparencySet { stream_id, enabled }))
            }

            // ---------------------------------------------------------------
            // Chat relay
            // ---------------------------------------------------------------
            InboundMessage::ChatMessage(chat) => {
                self.check_binding(&chat.stream_id, bound_stream)?;
                self.relay_chat(chat).await;
                Ok(None)
            }

            // Handled before this point; a second register is a state error.
            InboundMessage::Register { .. } => {
                Err(SessionError::Protocol("already registered".into()))
            }
        }
    }

    /// Handle the connection closing without an `end-stream`/unregister.
    ///
    /// A streamer's disconnect ends the whole stream; a viewer's disconnect
    /// removes just that viewer.
    pub async fn disconnect(&self, ctx: &ConnectionContext) {
        let ConnectionPhase::Registered {
            client_id,
            role,
            stream_id,
        } = &ctx.phase
        else {
            return;
        };

        match role {
            ClientRole::Streamer => {
                let viewers = self.registry.viewer_sockets(stream_id).await;
                self.registry.close_stream(stream_id).await;

                for socket in viewers {
                    socket.send(OutboundEvent::StreamEnded {
                        stream_id: stream_id.clone(),
                    });
                }

                tracing::info!(
                    peer = %ctx.peer_addr,
                    stream = %stream_id,
                    "Streamer disconnected, stream ended"
                );
            }
            ClientRole::Viewer => {
                self.registry.remove_viewer(stream_id, client_id).await;

                if let Some(socket) = self.registry.streamer_socket(stream_id).await {
                    socket.send(OutboundEvent::ViewerLeft {
                        stream_id: stream_id.clone(),
                        viewer_id: client_id.clone(),
                    });
                }

                tracing::info!(
                    peer = %ctx.peer_addr,
                    stream = %stream_id,
                    viewer = %client_id,
                    "Viewer disconnected"
                );
            }
        }
    }

    /// Relay a chat message to the streamer and every viewer of the stream
    async fn relay_chat(&self, chat: ChatMessage) {
        let stream_id = chat.stream_id.clone();

        if let Some(socket) = self.registry.streamer_socket(&stream_id).await {
            socket.send(OutboundEvent::ChatMessage(chat.clone()));
        }

        for socket in self.registry.viewer_sockets(&stream_id).await {
            socket.send(OutboundEvent::ChatMessage(chat.clone()));
        }
    }

    async fn fanout_to_viewers<F>(&self, stream_id: &str, event: F)
    where
        F: Fn(String) -> OutboundEvent,
    {
        for socket in self.registry.viewer_sockets(stream_id).await {
            socket.send(event(stream_id.to_string()));
        }
    }

    /// Mutating operations must target the stream the connection registered on
    fn check_binding(&self, requested: &str, bound: &str) -> Result<()> {
        if requested == bound {
            Ok(())
        } else {
            Err(SessionError::Protocol(format!(
                "not registered on stream {}",
                requested
            )))
        }
    }

    fn check_role(&self, actual: ClientRole, required: ClientRole, operation: &str) -> Result<()> {
        if actual == required {
            Ok(())
        } else {
            Err(SessionError::Protocol(format!(
                "{} requires the {} role",
                operation, required
            )))
        }
    }
}
