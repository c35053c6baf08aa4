//! Per-consumer state
//!
//! A [`Client`] is the registry-side handle for one attached consumer. It
//! owns the sender half of the consumer's bounded send queue; the writer
//! pump owns the receiver half. Closing the queue is an exactly-once
//! transition no matter how many tasks race to perform it.

use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame was queued for this consumer
    Queued,
    /// The consumer's queue is full; the frame was dropped for it
    QueueFull,
    /// The consumer is closed
    Closed,
}

/// One attached consumer
pub struct Client {
    client_id: String,
    stream_id: String,

    /// Sender half of the send queue. `None` once closed; taking it out is
    /// the exactly-once close transition, and dropping it unblocks the
    /// writer pump's `recv`.
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl Client {
    /// Create a client and the receiver half of its send queue
    pub(crate) fn new(
        client_id: String,
        stream_id: String,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let client = Self {
            client_id,
            stream_id,
            sender: Mutex::new(Some(tx)),
        };
        (client, rx)
    }

    /// Process-unique client id
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Id of the stream this client is attached to
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Try to deliver a frame without blocking
    pub(crate) fn try_send(&self, frame: Bytes) -> SendOutcome {
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => SendOutcome::Queued,
                Err(TrySendError::Full(_)) => SendOutcome::QueueFull,
                Err(TrySendError::Closed(_)) => SendOutcome::Closed,
            },
            None => SendOutcome::Closed,
        }
    }

    /// Close the send queue.
    ///
    /// Returns `true` for the one caller that performed the transition.
    /// Writer exit, reader exit, and stream teardown may all race here.
    pub(crate) fn close(&self) -> bool {
        self.sender.lock().unwrap().take().is_some()
    }

    /// Whether the send queue has been closed
    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 4])
    }

    #[tokio::test]
    async fn test_delivery_in_order() {
        let (client, mut rx) = Client::new("client_1".into(), "cam".into(), 4);

        assert_eq!(client.try_send(frame(1)), SendOutcome::Queued);
        assert_eq!(client.try_send(frame(2)), SendOutcome::Queued);

        assert_eq!(rx.recv().await.unwrap()[0], 1);
        assert_eq!(rx.recv().await.unwrap()[0], 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (client, mut rx) = Client::new("client_1".into(), "cam".into(), 2);

        assert_eq!(client.try_send(frame(1)), SendOutcome::Queued);
        assert_eq!(client.try_send(frame(2)), SendOutcome::Queued);
        assert_eq!(client.try_send(frame(3)), SendOutcome::QueueFull);

        // The overflow frame is gone; the queued ones survive
        assert_eq!(rx.recv().await.unwrap()[0], 1);
        assert_eq!(rx.recv().await.unwrap()[0], 2);
    }

    #[tokio::test]
    async fn test_close_is_exactly_once() {
        let (client, mut rx) = Client::new("client_1".into(), "cam".into(), 2);

        assert!(!client.is_closed());
        assert!(client.close());
        assert!(!client.close());
        assert!(!client.close());
        assert!(client.is_closed());

        // Receiver observes end-of-queue
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (client, _rx) = Client::new("client_1".into(), "cam".into(), 2);
        client.close();

        assert_eq!(client.try_send(frame(1)), SendOutcome::Closed);
    }

    #[tokio::test]
    async fn test_close_drains_pending_frames_first() {
        let (client, mut rx) = Client::new("client_1".into(), "cam".into(), 4);
        client.try_send(frame(5));
        client.close();

        // Frames queued before the close are still delivered
        assert_eq!(rx.recv().await.unwrap()[0], 5);
        assert!(rx.recv().await.is_none());
    }
}
