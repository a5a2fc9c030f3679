//! Error sentinels for the filesystem abstraction (spec §3, §6).

use std::io;

/// Errors produced by [`super::Fs`] and [`super::File`] implementations.
///
/// Every variant is a sentinel a caller can match without downcasting,
/// per spec §6 ("Error sentinels the library exposes for callers to match").
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// `op` could not find `path`.
    #[error("{op}: not found: {path}")]
    NotFound {
        /// The operation that failed (`"open"`, `"stat"`, ...).
        op: &'static str,
        /// The path that could not be resolved.
        path: String,
    },

    /// `op` refused to overwrite `path`, which already exists.
    #[error("{op}: already exists: {path}")]
    AlreadyExists {
        /// The operation that failed.
        op: &'static str,
        /// The path that already existed.
        path: String,
    },

    /// `op` on `path` was rejected by the backend's permission model.
    #[error("{op}: permission denied: {path}")]
    PermissionDenied {
        /// The operation that failed.
        op: &'static str,
        /// The path involved.
        path: String,
    },

    /// The handle was already closed.
    #[error("operation on closed handle")]
    Closed,

    /// The backend does not support this operation at all (e.g. `O_RDWR`,
    /// `O_APPEND`, `O_EXCL`, `O_SYNC` on an object-store backend, or a
    /// capability like symlinks on a backend that doesn't expose it).
    #[error("{op}: unsupported operation on this backend")]
    Unsupported {
        /// The unsupported operation, for matching and logging.
        op: &'static str,
    },

    /// The result of the operation is indeterminate: neither confirmed
    /// present nor confirmed absent. Distinguishes `Exists` returning
    /// `(false, Some(err))` from a confirmed `(false, None)`.
    #[error("{op}: indeterminate: {source}")]
    Indeterminate {
        /// The operation that could not determine a result.
        op: &'static str,
        /// The underlying cause.
        #[source]
        source: Box<FsError>,
    },

    /// An underlying I/O error from a local filesystem or network call.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FsError {
    /// Builds a [`FsError::NotFound`].
    pub fn not_found(op: &'static str, path: impl Into<String>) -> Self {
        FsError::NotFound {
            op,
            path: path.into(),
        }
    }

    /// Builds a [`FsError::AlreadyExists`].
    pub fn already_exists(op: &'static str, path: impl Into<String>) -> Self {
        FsError::AlreadyExists {
            op,
            path: path.into(),
        }
    }

    /// Builds a [`FsError::Unsupported`].
    pub fn unsupported(op: &'static str) -> Self {
        FsError::Unsupported { op }
    }

    /// True if this error represents a confirmed not-found condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound { .. } => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True if this error represents the handle having already been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, FsError::Closed)
    }

    /// True if this error represents an unsupported operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FsError::Unsupported { .. })
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io(e) => e,
            FsError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err.to_string()),
            FsError::AlreadyExists { .. } => {
                io::Error::new(io::ErrorKind::AlreadyExists, err.to_string())
            }
            FsError::PermissionDenied { .. } => {
                io::Error::new(io::ErrorKind::PermissionDenied, err.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Result alias for filesystem-abstraction operations.
pub type FsResult<T> = std::result::Result<T, FsError>;
