//! Stream registry for single-ingest fan-out
//!
//! The registry maps stream ids to live ingest pipelines and attaches an
//! arbitrary number of consumers to each. One transcoder subprocess feeds
//! one bounded frame pipe; the broadcaster copies each frame reference to
//! every consumer's bounded send queue.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<StreamRegistry>
//!                  ┌──────────────────────────┐
//!                  │ streams: HashMap<String, │
//!                  │   Arc<Stream> {          │
//!                  │     pipe: FramePipe,     │
//!                  │     clients: HashMap,    │
//!                  │   }                      │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!        transcoder stdout ──► ingest ──► FramePipe (drop oldest)
//!                                             │
//!                                        broadcaster
//!                               ┌─────────────┼─────────────┐
//!                               ▼             ▼             ▼
//!                          [Client 1]    [Client 2]    [Client N]
//!                          send queue    send queue    send queue
//!                          (drop newest, per consumer)
//!                               │             │             │
//!                               └──► websocket writer pumps ┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames are `bytes::Bytes`, so fan-out clones are reference-counted: all
//! consumer queues share the single allocation the ingest loop produced.

pub mod client;
pub mod error;
pub mod store;
pub mod stream;

pub use client::{Client, SendOutcome};
pub use error::RegistryError;
pub use store::{now_unix_nanos, StreamRegistry};
pub use stream::{Stream, StreamStats, StreamStatus, StreamSummary};
