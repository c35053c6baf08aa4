//! Stream registry implementation
//!
//! The central registry that manages all active streams and attaches
//! consumers to them. Creating a stream launches its ingest loop,
//! broadcaster, and health monitor; stopping it tears all of them down and
//! closes every attached consumer exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::broadcast;
use crate::config::RegistryConfig;
use crate::ingest::{self, Transcoder};
use crate::monitor;
use crate::registry::client::Client;
use crate::registry::error::RegistryError;
use crate::registry::stream::{Stream, StreamStats, StreamStatus, StreamSummary};

/// Central registry for all active streams
///
/// Thread-safe via `RwLock`. Read-heavy paths (lookup, attach, stats) take
/// the read lock; create and stop take the write lock for their whole
/// critical section, so a stream is externally visible iff its pipe is open
/// and its tasks are scheduled.
pub struct StreamRegistry {
    /// Map of stream id to stream
    streams: RwLock<HashMap<String, Arc<Stream>>>,

    /// Allocator for process-unique client ids
    next_client_id: AtomicU64,

    /// Builds the transcoder subprocess command for each ingest attempt
    transcoder: Arc<dyn Transcoder>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_config(transcoder, RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(transcoder: Arc<dyn Transcoder>, config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            transcoder,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a stream and launch its ingest, fan-out, and health tasks.
    ///
    /// Atomic: fails with `StreamAlreadyExists` if the id is taken. The
    /// spawned tasks never take the registry lock, so launching under it is
    /// safe.
    pub async fn create(
        &self,
        stream_id: &str,
        source_url: &str,
        width: u32,
        height: u32,
    ) -> Result<(), RegistryError> {
        let mut streams = self.streams.write().await;

        if streams.contains_key(stream_id) {
            return Err(RegistryError::StreamAlreadyExists(stream_id.to_string()));
        }

        let stream = Stream::new(
            stream_id.to_string(),
            source_url.to_string(),
            width,
            height,
            self.config.pipe_capacity,
        );
        streams.insert(stream_id.to_string(), Arc::clone(&stream));

        let cancel = stream.cancel_token();
        ingest::spawn(
            Arc::clone(&stream),
            Arc::clone(&self.transcoder),
            self.config.clone(),
            cancel,
        );
        broadcast::spawn(Arc::clone(&stream));
        monitor::spawn(
            Arc::clone(&stream),
            Arc::clone(&self.transcoder),
            self.config.clone(),
        );

        tracing::info!(
            stream = stream_id,
            source = source_url,
            width,
            height,
            "stream started"
        );
        Ok(())
    }

    /// Look up a stream by id
    pub async fn lookup(&self, stream_id: &str) -> Result<Arc<Stream>, RegistryError> {
        self.streams
            .read()
            .await
            .get(stream_id)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))
    }

    /// Summaries of all current streams
    pub async fn list(&self) -> Vec<StreamSummary> {
        let streams: Vec<Arc<Stream>> = self.streams.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(streams.len());
        for stream in streams {
            summaries.push(stream.summary().await);
        }
        summaries
    }

    /// Stats snapshot for one stream
    pub async fn stats(&self, stream_id: &str) -> Result<StreamStats, RegistryError> {
        Ok(self.lookup(stream_id).await?.stats().await)
    }

    /// Status snapshot (stats plus error history) for one stream
    pub async fn status(&self, stream_id: &str) -> Result<StreamStatus, RegistryError> {
        Ok(self.lookup(stream_id).await?.status().await)
    }

    /// Stop a stream and remove it from the registry.
    ///
    /// Without `force`, fails with `ConsumerBusy` while consumers are
    /// attached. Teardown order: cancel the transcoder, stop the health
    /// monitor, close the pipe, close each consumer exactly once. Closing
    /// a consumer's queue makes its writer pump emit a close frame and
    /// unwind.
    pub async fn stop(&self, stream_id: &str, force: bool) -> Result<(), RegistryError> {
        let mut streams = self.streams.write().await;

        let stream = streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        if !force {
            let client_count = stream.client_count().await;
            if client_count > 0 {
                return Err(RegistryError::ConsumerBusy {
                    stream_id: stream_id.to_string(),
                    client_count,
                });
            }
        }

        streams.remove(stream_id);
        stream.shutdown().await;

        tracing::info!(stream = stream_id, "stream stopped");
        Ok(())
    }

    /// Force-stop every stream. Used at process shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.streams.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id, true).await {
                tracing::warn!(stream = %id, error = %e, "failed to stop stream at shutdown");
            }
        }
    }

    /// Attach a consumer to a running stream.
    ///
    /// Returns the client handle and the receiver half of its send queue;
    /// the transport adapter spawns the reader/writer pumps around them.
    pub async fn attach_client(
        &self,
        stream_id: &str,
    ) -> Result<(Arc<Client>, mpsc::Receiver<Bytes>), RegistryError> {
        // Hold the registry lock across the whole attach so it cannot
        // interleave with a concurrent stop of the same stream.
        let streams = self.streams.read().await;
        let stream = streams
            .get(stream_id)
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        if !stream.is_running() {
            return Err(RegistryError::StreamNotRunning(stream_id.to_string()));
        }

        let n = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (client, rx) = Client::new(
            format!("client_{}", n),
            stream_id.to_string(),
            self.config.client_queue_capacity,
        );
        let client = Arc::new(client);
        stream.insert_client(Arc::clone(&client)).await;

        tracing::info!(
            client = %client.client_id(),
            stream = stream_id,
            "client attached"
        );
        Ok((client, rx))
    }

    /// Detach a consumer.
    ///
    /// Idempotent: writer exit, reader exit, and stream teardown may all
    /// call this concurrently; only the first performs the close and the
    /// map removal.
    pub async fn remove_client(&self, client: &Client) {
        if !client.close() {
            return;
        }

        if let Ok(stream) = self.lookup(client.stream_id()).await {
            stream.take_client(client.client_id()).await;
        }

        tracing::info!(
            client = %client.client_id(),
            stream = %client.stream_id(),
            "client removed"
        );
    }

    /// Consume one frame from a stream's pipe, waiting up to the configured
    /// frame timeout.
    ///
    /// `Ok(None)` means the timeout expired with no frame. A pipe that
    /// closes mid-wait reports the stream as not running.
    pub async fn latest_frame(&self, stream_id: &str) -> Result<Option<Bytes>, RegistryError> {
        let stream = self.lookup(stream_id).await?;

        if !stream.is_running() {
            return Err(RegistryError::StreamNotRunning(stream_id.to_string()));
        }

        match tokio::time::timeout(self.config.frame_timeout, stream.pipe().pop()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(RegistryError::StreamNotRunning(stream_id.to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Number of streams currently registered
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

/// Wall clock in nanoseconds since the Unix epoch, for frame timestamps
pub fn now_unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
