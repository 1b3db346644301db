//! Reqstate error types

/// Reqstate error types
///
/// `Clone` so a single transport outcome can be handed to every observer
/// that joined the same in-flight request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReqstateError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The caller aborted the request before the transport resolved.
    #[error("request aborted")]
    Aborted,

    /// The spawned request task panicked or was cancelled by the runtime.
    #[error("request task failed: {0}")]
    TaskFailed(String),

    // Data errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("no request adapter configured")]
    NoAdapter,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ReqstateError {
    /// Whether this error came from the transport (network or non-2xx status).
    ///
    /// Transport errors are surfaced to request state and never evict an
    /// existing cache entry.
    pub fn is_transport(&self) -> bool {
        matches!(self, ReqstateError::Http(_) | ReqstateError::Api { .. })
    }

    /// Whether the request was cancelled by the caller.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ReqstateError::Aborted)
    }

    /// HTTP status carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ReqstateError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ReqstateError {
    fn from(err: serde_json::Error) -> Self {
        ReqstateError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ReqstateError {
    fn from(err: std::io::Error) -> Self {
        ReqstateError::Storage(err.to_string())
    }
}

/// Result type alias for Reqstate operations
pub type Result<T> = std::result::Result<T, ReqstateError>;
