//! Transport/producer/consumer ledger
//!
//! Lifecycle bookkeeping for the engine handles owned by streamer and viewer
//! records. Every engine call here is awaited outside the registry locks and
//! bounded by the configured timeout; because a stream can be torn down while
//! a call is in flight, each operation re-checks that its target still exists
//! after resuming and closes the freshly created handle if it does not.

use std::sync::Arc;

use serde_json::Value;

use super::error::RegistryError;
use super::store::StreamRegistry;
use crate::engine::{
    ConsumerDescriptor, ConsumerHandle, EngineResult, MediaKind, ProducerDescriptor,
    ProducerHandle, TransportDescriptor, TransportHandle,
};
use crate::error::{Result, SessionError};

impl StreamRegistry {
    /// Create the streamer's send transport on the stream's router.
    ///
    /// An existing transport is closed and replaced; clients recreate their
    /// transport after ICE failure.
    pub async fn create_streamer_transport(&self, stream_id: &str) -> Result<TransportDescriptor> {
        let entry_arc = self.entry(stream_id).await?;
        let router = {
            let entry = entry_arc.read().await;
            if entry.closing {
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            Arc::clone(&entry.router)
        };

        let transport = self
            .engine_call(router.create_webrtc_transport(&self.config().transport_options))
            .await?;
        let descriptor = transport.descriptor();

        // The stream may have been torn down while the engine call was in
        // flight; re-check before storing the handle.
        let entry_arc = match self.entry(stream_id).await {
            Ok(entry_arc) => entry_arc,
            Err(e) => {
                close_transport(&transport, stream_id).await;
                return Err(e.into());
            }
        };

        let replaced = {
            let mut entry = entry_arc.write().await;
            if entry.closing {
                drop(entry);
                close_transport(&transport, stream_id).await;
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            entry.streamer.transport.replace(transport)
        };

        if let Some(old) = replaced {
            close_transport(&old, stream_id).await;
        }

        tracing::info!(stream = %stream_id, transport = %descriptor.id, "Streamer transport created");
        Ok(descriptor)
    }

    /// Create a viewer's receive transport on the stream's router
    pub async fn create_viewer_transport(
        &self,
        stream_id: &str,
        viewer_id: &str,
    ) -> Result<TransportDescriptor> {
        let entry_arc = self.entry(stream_id).await?;
        let router = {
            let entry = entry_arc.read().await;
            if entry.closing {
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            if !entry.viewers.contains_key(viewer_id) {
                return Err(RegistryError::ViewerNotFound(viewer_id.to_string()).into());
            }
            Arc::clone(&entry.router)
        };

        let transport = self
            .engine_call(router.create_webrtc_transport(&self.config().transport_options))
            .await?;
        let descriptor = transport.descriptor();

        let entry_arc = match self.entry(stream_id).await {
            Ok(entry_arc) => entry_arc,
            Err(e) => {
                close_transport(&transport, stream_id).await;
                return Err(e.into());
            }
        };

        let replaced = {
            let mut entry = entry_arc.write().await;
            if entry.closing {
                drop(entry);
                close_transport(&transport, stream_id).await;
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            match entry.viewers.get_mut(viewer_id) {
                Some(viewer) => viewer.transport.replace(transport),
                None => {
                    drop(entry);
                    close_transport(&transport, stream_id).await;
                    return Err(RegistryError::ViewerNotFound(viewer_id.to_string()).into());
                }
            }
        };

        if let Some(old) = replaced {
            close_transport(&old, stream_id).await;
        }

        tracing::info!(
            stream = %stream_id,
            viewer = %viewer_id,
            transport = %descriptor.id,
            "Viewer transport created"
        );
        Ok(descriptor)
    }

    /// Complete DTLS setup on the streamer's transport
    pub async fn connect_streamer_transport(
        &self,
        stream_id: &str,
        transport_id: &str,
        dtls_parameters: Value,
    ) -> Result<()> {
        let entry_arc = self.entry(stream_id).await?;
        let transport = {
            let entry = entry_arc.read().await;
            stored_transport(entry.streamer.transport.as_ref(), transport_id)?
        };

        self.engine_call(transport.connect(dtls_parameters)).await?;

        tracing::debug!(stream = %stream_id, transport = %transport_id, "Streamer transport connected");
        Ok(())
    }

    /// Complete DTLS setup on a viewer's transport
    pub async fn connect_viewer_transport(
        &self,
        stream_id: &str,
        viewer_id: &str,
        transport_id: &str,
        dtls_parameters: Value,
    ) -> Result<()> {
        let entry_arc = self.entry(stream_id).await?;
        let transport = {
            let entry = entry_arc.read().await;
            let viewer = entry
                .viewers
                .get(viewer_id)
                .ok_or_else(|| RegistryError::ViewerNotFound(viewer_id.to_string()))?;
            stored_transport(viewer.transport.as_ref(), transport_id)?
        };

        self.engine_call(transport.connect(dtls_parameters)).await?;

        tracing::debug!(
            stream = %stream_id,
            viewer = %viewer_id,
            transport = %transport_id,
            "Viewer transport connected"
        );
        Ok(())
    }

    /// Produce a media track on the streamer's transport.
    ///
    /// Stores the producer under its kind (replacing a previous one of the
    /// same kind) and flips `is_streaming` on first success.
    pub async fn produce(
        &self,
        stream_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerDescriptor> {
        let entry_arc = self.entry(stream_id).await?;
        let transport = {
            let entry = entry_arc.read().await;
            if entry.closing {
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            stored_transport(entry.streamer.transport.as_ref(), transport_id)?
        };

        let producer = self.engine_call(transport.produce(kind, rtp_parameters)).await?;
        let descriptor = ProducerDescriptor {
            id: producer.id(),
            kind: producer.kind(),
        };

        let entry_arc = match self.entry(stream_id).await {
            Ok(entry_arc) => entry_arc,
            Err(e) => {
                close_producer(&producer, stream_id).await;
                return Err(e.into());
            }
        };

        let replaced = {
            let mut entry = entry_arc.write().await;
            if entry.closing {
                drop(entry);
                close_producer(&producer, stream_id).await;
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            entry.streamer.store_producer(producer)
        };

        if let Some(old) = replaced {
            close_producer(&old, stream_id).await;
        }

        tracing::info!(stream = %stream_id, kind = %kind, producer = %descriptor.id, "Producer created");
        Ok(descriptor)
    }

    /// Create one consumer per streamer producer on the viewer's transport.
    ///
    /// Descriptor order follows producer insertion order. Consumers are
    /// created paused and resumed individually via `resume_consumer`.
    pub async fn consume(
        &self,
        stream_id: &str,
        viewer_id: &str,
        transport_id: &str,
        rtp_capabilities: Value,
    ) -> Result<Vec<ConsumerDescriptor>> {
        let entry_arc = self.entry(stream_id).await?;
        let (transport, producers) = {
            let entry = entry_arc.read().await;
            if entry.closing {
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            let viewer = entry
                .viewers
                .get(viewer_id)
                .ok_or_else(|| RegistryError::ViewerNotFound(viewer_id.to_string()))?;
            let transport = stored_transport(viewer.transport.as_ref(), transport_id)?;
            if entry.streamer.producers.is_empty() {
                return Err(RegistryError::NoProducers(stream_id.to_string()).into());
            }
            (transport, entry.streamer.producers.clone())
        };

        let mut consumers: Vec<Arc<dyn ConsumerHandle>> = Vec::with_capacity(producers.len());
        for producer in &producers {
            match self
                .engine_call(transport.consume(&producer.id(), rtp_capabilities.clone(), true))
                .await
            {
                Ok(consumer) => consumers.push(consumer),
                Err(e) => {
                    close_consumers(&consumers, stream_id).await;
                    return Err(e);
                }
            }
        }

        let entry_arc = match self.entry(stream_id).await {
            Ok(entry_arc) => entry_arc,
            Err(e) => {
                close_consumers(&consumers, stream_id).await;
                return Err(e.into());
            }
        };

        let descriptors: Vec<ConsumerDescriptor> =
            consumers.iter().map(|c| c.descriptor()).collect();

        {
            let mut entry = entry_arc.write().await;
            if entry.closing {
                drop(entry);
                close_consumers(&consumers, stream_id).await;
                return Err(RegistryError::StreamNotFound(stream_id.to_string()).into());
            }
            match entry.viewers.get_mut(viewer_id) {
                Some(viewer) => viewer.consumers.extend(consumers),
                None => {
                    drop(entry);
                    close_consumers(&consumers, stream_id).await;
                    return Err(RegistryError::ViewerNotFound(viewer_id.to_string()).into());
                }
            }
        }

        tracing::info!(
            stream = %stream_id,
            viewer = %viewer_id,
            consumers = descriptors.len(),
            "Consumers created"
        );
        Ok(descriptors)
    }

    /// Resume a paused consumer.
    ///
    /// A missing stream, viewer, or consumer is a silent no-op; the client
    /// may be resuming something that was already torn down.
    pub async fn resume_consumer(
        &self,
        stream_id: &str,
        viewer_id: &str,
        consumer_id: &str,
    ) -> Result<()> {
        let Ok(entry_arc) = self.entry(stream_id).await else {
            return Ok(());
        };

        let consumer = {
            let entry = entry_arc.read().await;
            entry
                .viewers
                .get(viewer_id)
                .and_then(|v| v.consumer(consumer_id).cloned())
        };

        match consumer {
            Some(consumer) => {
                self.engine_call(consumer.resume()).await?;
                tracing::debug!(
                    stream = %stream_id,
                    viewer = %viewer_id,
                    consumer = %consumer_id,
                    "Consumer resumed"
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Await an engine call under the configured bound.
    ///
    /// Engine rejections are logged with context and surfaced as a generic
    /// error; a blown deadline becomes `Timeout`.
    pub(crate) async fn engine_call<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.config().engine_call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Media engine call failed");
                Err(SessionError::Engine(e))
            }
            Err(_) => Err(SessionError::Timeout),
        }
    }
}

/// Match a stored transport handle against the id the client sent
fn stored_transport(
    stored: Option<&Arc<dyn TransportHandle>>,
    transport_id: &str,
) -> std::result::Result<Arc<dyn TransportHandle>, RegistryError> {
    match stored {
        Some(transport) if transport.id() == transport_id => Ok(Arc::clone(transport)),
        _ => Err(RegistryError::TransportNotFound(transport_id.to_string())),
    }
}

async fn close_transport(transport: &Arc<dyn TransportHandle>, stream_id: &str) {
    if let Err(e) = transport.close().await {
        tracing::debug!(stream = %stream_id, error = %e, "Transport close failed");
    }
}

async fn close_producer(producer: &Arc<dyn ProducerHandle>, stream_id: &str) {
    if let Err(e) = producer.close().await {
        tracing::debug!(stream = %stream_id, error = %e, "Producer close failed");
    }
}

async fn close_consumers(consumers: &[Arc<dyn ConsumerHandle>], stream_id: &str) {
    for consumer in consumers {
        if let Err(e) = consumer.close().await {
            tracing::debug!(stream = %stream_id, error = %e, "Consumer close failed");
        }
    }
}
