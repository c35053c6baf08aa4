//! Registry error types
//!
//! Error types for stream registry operations.

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// No stream with this id
    StreamNotFound(String),
    /// A stream with this id already exists
    StreamAlreadyExists(String),
    /// Stream exists but has no live transcoder
    StreamNotRunning(String),
    /// Stream still has attached consumers and the stop was not forced
    ConsumerBusy {
        stream_id: String,
        client_count: usize,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            RegistryError::StreamAlreadyExists(id) => {
                write!(f, "Stream {} already exists", id)
            }
            RegistryError::StreamNotRunning(id) => write!(f, "Stream not running: {}", id),
            RegistryError::ConsumerBusy {
                stream_id,
                client_count,
            } => write!(
                f,
                "Cannot stop stream {}: {} client(s) still connected",
                stream_id, client_count
            ),
        }
    }
}

impl std::error::Error for RegistryError {}
