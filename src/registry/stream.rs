//! Per-stream state
//!
//! One [`Stream`] per camera: the frame pipe, the attached consumers, and
//! the runtime state the ingest loop and health monitor coordinate through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::pipe::FramePipe;
use crate::registry::client::Client;

/// One ingest pipeline and its consumers
pub struct Stream {
    stream_id: String,
    source_url: String,
    width: u32,
    height: u32,

    /// Bounded pipe between the transcoder reader and the broadcaster
    pipe: FramePipe,

    /// Attached consumers, read-snapshotted by the broadcaster
    clients: RwLock<HashMap<String, Arc<Client>>>,

    /// State shared between ingest loop, health monitor, and stats
    runtime: StdRwLock<Runtime>,

    /// Stops the health monitor at teardown
    health_stop: CancellationToken,
}

struct Runtime {
    /// True while a transcoder subprocess is live
    running: bool,
    /// Total frames read since creation
    frame_count: u64,
    /// Clocks of the most recent frame: monotonic for stall detection,
    /// wall for reporting
    last_frame: Option<(Instant, SystemTime)>,
    /// Most recent transcoder error, for the status endpoint
    last_error: Option<String>,
    /// Transcoder errors since creation
    error_count: u32,
    /// Tears down the current transcoder incarnation when cancelled
    cancel: CancellationToken,
}

impl Stream {
    /// Create a stream; dimensions are immutable afterwards
    pub(crate) fn new(
        stream_id: String,
        source_url: String,
        width: u32,
        height: u32,
        pipe_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            source_url,
            width,
            height,
            pipe: FramePipe::new(pipe_capacity),
            clients: RwLock::new(HashMap::new()),
            runtime: StdRwLock::new(Runtime {
                running: false,
                frame_count: 0,
                last_frame: None,
                last_error: None,
                error_count: 0,
                cancel: CancellationToken::new(),
            }),
            health_stop: CancellationToken::new(),
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size in bytes of one raw BGR24 frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn pipe(&self) -> &FramePipe {
        &self.pipe
    }

    pub(crate) fn health_stop(&self) -> &CancellationToken {
        &self.health_stop
    }

    pub fn is_running(&self) -> bool {
        self.runtime.read().unwrap().running
    }

    /// Total frames read since creation
    pub fn frame_count(&self) -> u64 {
        self.runtime.read().unwrap().frame_count
    }

    /// Transcoder errors since creation
    pub fn error_count(&self) -> u32 {
        self.runtime.read().unwrap().error_count
    }

    pub(crate) fn mark_running(&self, running: bool) {
        self.runtime.write().unwrap().running = running;
    }

    /// Record one successfully read frame
    pub(crate) fn record_frame(&self) {
        let mut rt = self.runtime.write().unwrap();
        rt.frame_count += 1;
        rt.last_frame = Some((Instant::now(), SystemTime::now()));
    }

    /// Record a transcoder failure
    pub(crate) fn record_error(&self, message: String) {
        let mut rt = self.runtime.write().unwrap();
        rt.last_error = Some(message);
        rt.error_count += 1;
    }

    /// Token tearing down the current transcoder incarnation
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.runtime.read().unwrap().cancel.clone()
    }

    /// Whether the stream is running but has gone `threshold` without a frame.
    /// A running stream that has never produced a frame counts as stalled.
    pub(crate) fn is_stalled(&self, threshold: Duration) -> bool {
        let rt = self.runtime.read().unwrap();
        rt.running
            && rt
                .last_frame
                .map_or(true, |(instant, _)| instant.elapsed() > threshold)
    }

    /// Cancel the current transcoder incarnation and install a fresh token
    /// for its replacement. The stream is not running until the replacement
    /// reports in.
    pub(crate) fn reset_for_restart(&self) -> CancellationToken {
        let mut rt = self.runtime.write().unwrap();
        let old = std::mem::replace(&mut rt.cancel, CancellationToken::new());
        rt.running = false;
        old.cancel();
        rt.cancel.clone()
    }

    /// Tear the stream down: kill the transcoder, stop the health monitor,
    /// close the pipe, and close every consumer exactly once.
    pub(crate) async fn shutdown(&self) {
        self.cancel_token().cancel();
        self.health_stop.cancel();
        self.mark_running(false);
        self.pipe.close();

        let mut clients = self.clients.write().await;
        for (_, client) in clients.drain() {
            client.close();
        }
    }

    pub(crate) async fn insert_client(&self, client: Arc<Client>) {
        self.clients
            .write()
            .await
            .insert(client.client_id().to_string(), client);
    }

    pub(crate) async fn take_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.write().await.remove(client_id)
    }

    /// Copy the current consumer set; the broadcaster delivers against this
    /// snapshot without holding the map lock.
    pub(crate) async fn snapshot_clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().await.values().cloned().collect()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub(crate) async fn summary(&self) -> StreamSummary {
        let client_count = self.client_count().await;
        let rt = self.runtime.read().unwrap();
        StreamSummary {
            stream_id: self.stream_id.clone(),
            rtsp_url: self.source_url.clone(),
            is_running: rt.running,
            client_count,
            frame_count: rt.frame_count,
        }
    }

    pub(crate) async fn stats(&self) -> StreamStats {
        let client_count = self.client_count().await;
        let buffer_depth = self.pipe.len();
        let rt = self.runtime.read().unwrap();
        StreamStats {
            stream_id: self.stream_id.clone(),
            rtsp_url: self.source_url.clone(),
            is_running: rt.running,
            frame_count: rt.frame_count,
            last_frame_time: rt.last_frame.map(|(_, wall)| unix_millis(wall)),
            seconds_since_last_frame: rt
                .last_frame
                .map(|(instant, _)| instant.elapsed().as_secs_f64()),
            client_count,
            buffer_depth,
        }
    }

    pub(crate) async fn status(&self) -> StreamStatus {
        let client_count = self.client_count().await;
        let rt = self.runtime.read().unwrap();
        let status = if rt.running {
            "running"
        } else if rt.error_count > 0 {
            "error"
        } else {
            "starting"
        };
        StreamStatus {
            stream_id: self.stream_id.clone(),
            rtsp_url: self.source_url.clone(),
            status,
            is_running: rt.running,
            frame_count: rt.frame_count,
            error_count: rt.error_count,
            last_error: rt.last_error.clone(),
            last_frame_time: rt.last_frame.map(|(_, wall)| unix_millis(wall)),
            seconds_since_last_frame: rt
                .last_frame
                .map(|(instant, _)| instant.elapsed().as_secs_f64()),
            client_count,
        }
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-stream line of the list endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub stream_id: String,
    pub rtsp_url: String,
    pub is_running: bool,
    pub client_count: usize,
    pub frame_count: u64,
}

/// Stats snapshot for one stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub stream_id: String,
    pub rtsp_url: String,
    pub is_running: bool,
    pub frame_count: u64,
    /// Wall clock of the most recent frame, Unix milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last_frame: Option<f64>,
    pub client_count: usize,
    /// Frames currently queued in the frame pipe
    pub buffer_depth: usize,
}

/// Status snapshot including error history
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub stream_id: String,
    pub rtsp_url: String,
    pub status: &'static str,
    pub is_running: bool,
    pub frame_count: u64,
    pub error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last_frame: Option<f64>,
    pub client_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Arc<Stream> {
        Stream::new("cam1".into(), "rtsp://example/1".into(), 64, 48, 4)
    }

    #[test]
    fn test_frame_size() {
        let s = stream();
        assert_eq!(s.frame_size(), 64 * 48 * 3);
    }

    #[test]
    fn test_frame_count_is_monotone() {
        let s = stream();
        assert_eq!(s.runtime.read().unwrap().frame_count, 0);

        s.record_frame();
        s.record_frame();
        let rt = s.runtime.read().unwrap();
        assert_eq!(rt.frame_count, 2);
        assert!(rt.last_frame.is_some());
    }

    #[test]
    fn test_stalled_requires_running() {
        let s = stream();

        // Not running: never stalled, even with no frames
        assert!(!s.is_stalled(Duration::ZERO));

        // Running with no frame yet counts as stalled
        s.mark_running(true);
        assert!(s.is_stalled(Duration::ZERO));

        // A fresh frame clears the stall
        s.record_frame();
        assert!(!s.is_stalled(Duration::from_secs(10)));
    }

    #[test]
    fn test_reset_for_restart_swaps_token() {
        let s = stream();
        s.mark_running(true);
        let old = s.cancel_token();

        let fresh = s.reset_for_restart();

        assert!(old.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert!(!s.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_closes_pipe_and_clients() {
        let s = stream();
        s.mark_running(true);

        let (client, mut rx) = Client::new("client_1".into(), "cam1".into(), 2);
        let client = Arc::new(client);
        s.insert_client(Arc::clone(&client)).await;

        s.shutdown().await;

        assert!(s.pipe().is_closed());
        assert!(s.cancel_token().is_cancelled());
        assert!(s.health_stop().is_cancelled());
        assert!(client.is_closed());
        assert_eq!(s.client_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_status_labels() {
        let s = stream();
        assert_eq!(s.status().await.status, "starting");

        s.record_error("boom".into());
        assert_eq!(s.status().await.status, "error");

        s.mark_running(true);
        let status = s.status().await;
        assert_eq!(status.status, "running");
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }
}
