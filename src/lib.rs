//! Single-ingest, multi-consumer RTSP fan-out server
//!
//! For each configured camera the server keeps exactly one RTSP pull alive,
//! delegated to an external transcoder subprocess, and distributes the
//! decoded raw BGR24 frames to any number of concurrent consumers: a
//! persistent websocket push channel and an on-demand HTTP pull endpoint.
//! One decode per camera regardless of viewer count, no segmentation, no
//! re-encoding.
//!
//! The moving parts, producer first:
//!
//! - [`ingest`] supervises the transcoder subprocess and reads fixed-size
//!   raw frames into the stream's [`pipe::FramePipe`] (bounded, drop-oldest).
//! - [`broadcast`] fans each frame out to every attached consumer's bounded
//!   send queue (drop-newest per slow consumer).
//! - [`monitor`] restarts the transcoder when a running stream stalls.
//! - [`registry`] owns the streams and the attach/stop/teardown discipline.
//! - [`api`] is the HTTP/websocket adapter over the registry.

pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod pipe;
pub mod registry;

pub use api::AppState;
pub use config::{RegistryConfig, ServerConfig};
pub use error::{Error, Result};
pub use ingest::{FfmpegTranscoder, Transcoder};
pub use pipe::{FramePipe, PushOutcome};
pub use registry::{RegistryError, StreamRegistry};
