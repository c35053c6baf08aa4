//! Transcoder ingest: subprocess supervision and frame reading
//!
//! One supervision loop per stream keeps a transcoder subprocess alive and
//! streams its decoded output into the frame pipe. The transcoder itself is
//! a black box behind the [`Transcoder`] trait.

pub mod supervisor;
pub mod transcoder;

pub(crate) use supervisor::spawn;
pub use transcoder::{FfmpegTranscoder, Transcoder};
