//! Crate-level error type

use crate::registry::RegistryError;

/// Errors surfaced by the server itself (startup, listener, transcoder probe).
///
/// Per-stream failures are [`RegistryError`]; transcoder runtime failures are
/// logged and retried inside the ingest loop and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the listener or process plumbing
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The transcoder binary is missing or refused to run
    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// A registry operation failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, Error>;
