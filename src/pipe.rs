//! Bounded frame pipe between ingest and fan-out
//!
//! The pipe is the single serialization point between the transcoder reader
//! and the broadcaster. It never blocks the producer: when full, the oldest
//! queued frame is evicted so the freshest frames stay available. Consumers
//! (the broadcaster, and the pull endpoint) await frames and drain whatever
//! remains after the pipe is closed.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

/// Result of a non-blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame was queued
    Queued,
    /// Pipe was at capacity; the oldest frame was evicted to make room
    DroppedOldest,
    /// Pipe is closed; the frame was discarded
    Closed,
}

/// Bounded FIFO of frames with drop-oldest overflow behavior
#[derive(Debug)]
pub struct FramePipe {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Bytes>,
    closed: bool,
}

impl FramePipe {
    /// Create a pipe holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a frame without blocking.
    ///
    /// At capacity, exactly one oldest frame is evicted first. Pushing into
    /// a closed pipe discards the frame and reports [`PushOutcome::Closed`],
    /// which makes the close/push race during teardown benign.
    pub fn push(&self, frame: Bytes) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return PushOutcome::Closed;
            }
            let outcome = if inner.queue.len() >= self.capacity {
                inner.queue.pop_front();
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            inner.queue.push_back(frame);
            outcome
        };
        self.notify.notify_waiters();
        outcome
    }

    /// Receive the next frame.
    ///
    /// Waits until a frame is available. After [`close`](Self::close), the
    /// remaining queued frames are still delivered; `None` means the pipe is
    /// closed and drained. Safe to call from multiple tasks concurrently.
    pub async fn pop(&self) -> Option<Bytes> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking, so a push between the
            // check and the await cannot be missed.
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.queue.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next frame if one is immediately available
    pub fn try_pop(&self) -> Option<Bytes> {
        self.inner.lock().unwrap().queue.pop_front()
    }

    /// Close the pipe. Idempotent; queued frames stay readable until drained.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    /// Whether the pipe has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Number of frames currently queued
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Whether the pipe is currently empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
