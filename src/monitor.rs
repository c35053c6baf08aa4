//! Stream health monitoring
//!
//! One monitor task per stream. It watches the time since the last frame
//! and, when a running stream stalls, cancels the current transcoder
//! incarnation and launches a fresh one with the same parameters.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::config::RegistryConfig;
use crate::ingest::{self, Transcoder};
use crate::registry::Stream;

/// Launch the health monitor for a stream. It ends when the stream's
/// health-stop token fires.
pub(crate) fn spawn(
    stream: Arc<Stream>,
    transcoder: Arc<dyn Transcoder>,
    config: RegistryConfig,
) -> JoinHandle<()> {
    tokio::spawn(run(stream, transcoder, config))
}

async fn run(stream: Arc<Stream>, transcoder: Arc<dyn Transcoder>, config: RegistryConfig) {
    // First check one full interval after launch, not immediately: a stream
    // that has not produced its first frame yet is not a stall.
    let mut ticker = interval_at(
        Instant::now() + config.health_interval,
        config.health_interval,
    );

    loop {
        tokio::select! {
            _ = stream.health_stop().cancelled() => break,
            _ = ticker.tick() => {
                if !stream.is_stalled(config.stall_threshold) {
                    continue;
                }

                tracing::warn!(
                    stream = %stream.stream_id(),
                    "stream stalled, restarting transcoder"
                );

                let fresh = stream.reset_for_restart();
                ingest::spawn(
                    Arc::clone(&stream),
                    Arc::clone(&transcoder),
                    config.clone(),
                    fresh,
                );
            }
        }
    }

    tracing::debug!(stream = %stream.stream_id(), "health monitor stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::process::Command;

    use super::*;

    /// Spawns a live but silent subprocess and counts how many times it was
    /// asked for a command.
    struct CountingTranscoder {
        launches: AtomicUsize,
    }

    impl Transcoder for CountingTranscoder {
        fn command(&self, _url: &str, _width: u32, _height: u32) -> Command {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let mut cmd = Command::new("sleep");
            cmd.arg("600");
            cmd
        }
    }

    fn fast_config() -> RegistryConfig {
        RegistryConfig::default()
            .health_interval(Duration::from_millis(50))
            .stall_threshold(Duration::from_millis(100))
            .restart_delay(Duration::from_millis(20))
    }

    async fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
        let end = tokio::time::Instant::now() + deadline;
        while tokio::time::Instant::now() < end {
            if pred() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pred()
    }

    #[tokio::test]
    async fn test_stalled_stream_gets_restarted() {
        let stream = Stream::new("cam1".into(), "rtsp://example/1".into(), 8, 8, 100);
        let transcoder = Arc::new(CountingTranscoder {
            launches: AtomicUsize::new(0),
        });
        let config = fast_config();

        ingest::spawn(
            Arc::clone(&stream),
            Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            config.clone(),
            stream.cancel_token(),
        );
        let monitor = spawn(
            Arc::clone(&stream),
            Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            config,
        );

        // The silent transcoder runs but never produces a frame, so the
        // monitor must replace it at least once
        assert!(
            wait_until(Duration::from_secs(5), || {
                transcoder.launches.load(Ordering::SeqCst) >= 2
            })
            .await
        );
        // The replacement reported in
        assert!(wait_until(Duration::from_secs(5), || stream.is_running()).await);

        stream.shutdown().await;
        let _ = tokio::time::timeout(Duration::from_secs(5), monitor).await;
    }

    #[tokio::test]
    async fn test_healthy_stream_is_left_alone() {
        let stream = Stream::new("cam1".into(), "rtsp://example/1".into(), 8, 8, 100);
        let transcoder = Arc::new(CountingTranscoder {
            launches: AtomicUsize::new(0),
        });

        // Pretend frames keep arriving
        stream.mark_running(true);
        stream.record_frame();

        let monitor = spawn(
            Arc::clone(&stream),
            Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            RegistryConfig::default()
                .health_interval(Duration::from_millis(30))
                .stall_threshold(Duration::from_secs(60)),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transcoder.launches.load(Ordering::SeqCst), 0);

        stream.health_stop().cancel();
        assert!(tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_stops_on_health_stop() {
        let stream = Stream::new("cam1".into(), "rtsp://example/1".into(), 8, 8, 100);
        let transcoder = Arc::new(CountingTranscoder {
            launches: AtomicUsize::new(0),
        });

        let monitor = spawn(
            Arc::clone(&stream),
            transcoder as Arc<dyn Transcoder>,
            RegistryConfig::default(),
        );

        stream.health_stop().cancel();
        assert!(tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .is_ok());
    }
}
