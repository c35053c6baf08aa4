//! Transcoder subprocess command construction
//!
//! The server never decodes video itself. A transcoder child process pulls
//! the RTSP source and writes raw BGR24 frames to stdout; this module only
//! knows how to build its command line.

use std::path::PathBuf;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Builds the transcoder command for one ingest attempt.
///
/// Implementations supply the program and arguments; the ingest loop wires
/// stdio and lifetime. Tests substitute a fake that emits deterministic
/// frame-sized blobs.
pub trait Transcoder: Send + Sync {
    /// Command producing raw BGR24 frames of `width*height*3` bytes on
    /// stdout, with diagnostics on stderr
    fn command(&self, source_url: &str, width: u32, height: u32) -> Command;
}

/// FFmpeg-based transcoder: RTSP over TCP in, packed BGR24 on stdout, no
/// audio, no container.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    /// Use the given ffmpeg binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Verify the binary runs at all. Called once at startup; a missing
    /// transcoder is fatal.
    pub async fn probe(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| {
                Error::TranscoderUnavailable(format!("{}: {}", self.program.display(), e))
            })?;

        if !status.success() {
            return Err(Error::TranscoderUnavailable(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        Ok(())
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn command(&self, source_url: &str, width: u32, height: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-rtsp_transport")
            .arg("tcp")
            .arg("-i")
            .arg(source_url)
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height))
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-an")
            .arg("-");
        cmd
    }
}
