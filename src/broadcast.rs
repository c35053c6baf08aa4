//! Frame fan-out
//!
//! One broadcaster task per stream: receive from the frame pipe, snapshot
//! the consumer set, and enqueue the frame on each consumer without ever
//! blocking. A slow consumer loses its own frames and nothing else.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::registry::{SendOutcome, Stream};

/// Launch the fan-out task for a stream. It ends when the frame pipe
/// closes.
pub(crate) fn spawn(stream: Arc<Stream>) -> JoinHandle<()> {
    tokio::spawn(run(stream))
}

async fn run(stream: Arc<Stream>) {
    while let Some(frame) = stream.pipe().pop().await {
        // Snapshot under the read lock, deliver outside it. A consumer
        // attached after this point sees only later frames.
        let clients = stream.snapshot_clients().await;

        for client in clients {
            match client.try_send(frame.clone()) {
                SendOutcome::Queued => {}
                SendOutcome::QueueFull => {
                    tracing::debug!(
                        client = %client.client_id(),
                        stream = %stream.stream_id(),
                        "client queue full, skipping frame"
                    );
                }
                SendOutcome::Closed => {}
            }
        }
    }

    tracing::info!(stream = %stream.stream_id(), "frame distribution stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::registry::Client;

    fn test_stream() -> Arc<Stream> {
        Stream::new("cam1".into(), "rtsp://example/1".into(), 8, 8, 100)
    }

    fn frame(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 16])
    }

    async fn attach(stream: &Stream, id: &str, capacity: usize) -> (Arc<Client>, tokio::sync::mpsc::Receiver<Bytes>) {
        let (client, rx) = Client::new(id.to_string(), stream.stream_id().to_string(), capacity);
        let client = Arc::new(client);
        stream.insert_client(Arc::clone(&client)).await;
        (client, rx)
    }

    #[tokio::test]
    async fn test_fans_out_to_all_clients_in_order() {
        let stream = test_stream();
        let (_a, mut rx_a) = attach(&stream, "client_1", 10).await;
        let (_b, mut rx_b) = attach(&stream, "client_2", 10).await;

        let handle = spawn(Arc::clone(&stream));

        stream.pipe().push(frame(1));
        stream.pipe().push(frame(2));
        stream.pipe().push(frame(3));

        for rx in [&mut rx_a, &mut rx_b] {
            for expected in 1..=3u8 {
                let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(got[0], expected);
            }
        }

        stream.pipe().close();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_siblings() {
        let stream = test_stream();
        // The slow consumer can hold one frame; the fast one holds plenty
        let (_slow, mut rx_slow) = attach(&stream, "client_1", 1).await;
        let (_fast, mut rx_fast) = attach(&stream, "client_2", 10).await;

        let handle = spawn(Arc::clone(&stream));

        for i in 1..=5u8 {
            stream.pipe().push(frame(i));
        }

        // The fast consumer receives every frame in order
        for expected in 1..=5u8 {
            let got = tokio::time::timeout(Duration::from_secs(1), rx_fast.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got[0], expected);
        }

        // The slow consumer kept the first frame and lost the overflow
        let got = tokio::time::timeout(Duration::from_secs(1), rx_slow.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got[0], 1);

        stream.pipe().close();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn test_closed_client_is_skipped() {
        let stream = test_stream();
        let (closed, _rx_closed) = attach(&stream, "client_1", 10).await;
        let (_open, mut rx_open) = attach(&stream, "client_2", 10).await;
        closed.close();

        let handle = spawn(Arc::clone(&stream));
        stream.pipe().push(frame(9));

        let got = tokio::time::timeout(Duration::from_secs(1), rx_open.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got[0], 9);

        stream.pipe().close();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn test_terminates_when_pipe_closes() {
        let stream = test_stream();
        let handle = spawn(Arc::clone(&stream));

        stream.pipe().close();

        assert!(tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .is_ok());
    }
}
