//! Error sentinels for the registry wrapper (spec §4.3, §6).

/// Errors produced while talking to an OCI registry.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OciError {
    /// Credential resolution or the registry's auth challenge failed.
    #[error("authentication failed for {registry}: {reason}")]
    Authentication {
        /// The registry host involved.
        registry: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The registry could not be reached at all (DNS, TCP, TLS failure, or a
    /// 5xx/connection-reset that isn't worth distinguishing further).
    #[error("registry {registry} unreachable: {reason}")]
    RegistryUnreachable {
        /// The registry host involved.
        registry: String,
        /// Human-readable cause.
        reason: String,
    },

    /// `reference` could not be parsed as `host[:port]/path/repo(:tag|@digest)`.
    #[error("invalid reference {0:?}")]
    Reference(String),

    /// The manifest was malformed, had an unexpected media type, or failed
    /// digest verification.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The underlying registry client returned an error not covered above.
    #[error("registry client error: {0}")]
    Client(String),

    /// The push/pull was cancelled mid-flight via a `CancellationToken`.
    #[error("registry operation cancelled")]
    Cancelled,

    /// A local I/O error while streaming a blob to/from disk or memory.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A manifest or config blob failed to (de)serialize as JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OciError {
    /// True if this looks like a transient condition worth retrying
    /// (registry unreachable, not an auth or reference error).
    pub fn is_retryable(&self) -> bool {
        matches!(self, OciError::RegistryUnreachable { .. })
    }
}

/// Result alias for registry operations.
pub type OciResult<T> = std::result::Result<T, OciError>;
