//! Transcoder supervision and frame reading
//!
//! One supervision loop per stream incarnation: spawn the transcoder, read
//! fixed-size raw frames from its stdout into the frame pipe, and restart
//! it after a delay whenever it dies. The loop ends when its cancellation
//! token fires (stop or health restart) or when the pipe closes underneath
//! it (teardown).

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RegistryConfig;
use crate::ingest::transcoder::Transcoder;
use crate::pipe::PushOutcome;
use crate::registry::Stream;

/// Why a single transcoder incarnation ended
enum ExitReason {
    /// The cancellation token fired
    Cancelled,
    /// The frame pipe closed; the stream is being torn down
    PipeClosed,
}

/// Launch the supervision loop for one stream incarnation
pub(crate) fn spawn(
    stream: Arc<Stream>,
    transcoder: Arc<dyn Transcoder>,
    config: RegistryConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(stream, transcoder, config, cancel))
}

async fn run(
    stream: Arc<Stream>,
    transcoder: Arc<dyn Transcoder>,
    config: RegistryConfig,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match run_transcoder(&stream, transcoder.as_ref(), &cancel).await {
            Ok(ExitReason::Cancelled) | Ok(ExitReason::PipeClosed) => break,
            Err(e) => {
                stream.record_error(e.to_string());
                tracing::warn!(
                    stream = %stream.stream_id(),
                    error = %e,
                    "transcoder exited, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.restart_delay) => {}
                }
            }
        }
    }

    tracing::debug!(stream = %stream.stream_id(), "ingest loop stopped");
}

/// Run one transcoder subprocess until it dies, the pipe closes, or the
/// token fires. Returns `Err` for anything that warrants a retry.
async fn run_transcoder(
    stream: &Stream,
    transcoder: &dyn Transcoder,
    cancel: &CancellationToken,
) -> io::Result<ExitReason> {
    let mut cmd = transcoder.command(stream.source_url(), stream.width(), stream.height());
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "transcoder stdout not captured"))?;

    if let Some(stderr) = child.stderr.take() {
        drain_stderr(stream.stream_id().to_string(), stderr);
    }

    stream.mark_running(true);
    tracing::info!(stream = %stream.stream_id(), "transcoder started");

    // Frames are fixed-size records; a short read is end-of-stream. The
    // scratch buffer is copied per frame so consumers own their bytes.
    let mut scratch = vec![0u8; stream.frame_size()];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill(&mut child).await;
                return Ok(ExitReason::Cancelled);
            }
            read = stdout.read_exact(&mut scratch) => {
                if let Err(e) = read {
                    kill(&mut child).await;
                    return Err(e);
                }

                match stream.pipe().push(Bytes::copy_from_slice(&scratch)) {
                    PushOutcome::Queued => stream.record_frame(),
                    PushOutcome::DroppedOldest => {
                        stream.record_frame();
                        tracing::debug!(
                            stream = %stream.stream_id(),
                            "frame pipe full, dropped oldest frame"
                        );
                    }
                    PushOutcome::Closed => {
                        kill(&mut child).await;
                        return Ok(ExitReason::PipeClosed);
                    }
                }
            }
        }
    }
}

/// Forward transcoder diagnostics into the log without ever blocking the
/// frame reader.
fn drain_stderr(stream_id: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(stream = %stream_id, "transcoder: {}", line);
        }
    });
}

async fn kill(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
