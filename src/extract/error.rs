//! Error sentinels for the safe-extraction pipeline (spec §4.5, §6).
//!
//! Every variant names the validator that rejected the entry and, where
//! relevant, both the attempted and allowed byte counts, so a caller can
//! report *why* an archive was rejected without re-deriving it.

/// Errors produced while validating or extracting a tar archive.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// An entry's path climbed outside the extraction root via `..`.
    #[error("path-safety: path traversal detected, entry {entry:?} escapes the extraction root")]
    PathTraversal {
        /// The offending entry's raw path as stored in the archive.
        entry: String,
    },

    /// An entry's path was absolute or a Windows drive/UNC path.
    #[error("path-safety: entry {entry:?} is an absolute path")]
    AbsolutePath {
        /// The offending entry's raw path.
        entry: String,
    },

    /// An entry's path contained a disallowed control character or
    /// percent-encoded traversal sequence.
    #[error("path-safety: entry {entry:?} has an invalid name: {reason}")]
    InvalidEntryName {
        /// The offending entry's raw path.
        entry: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// A hidden (dotfile) entry was rejected by policy.
    #[error("path-safety: hidden entry {entry:?} rejected by policy")]
    HiddenEntryRejected {
        /// The offending entry's raw path.
        entry: String,
    },

    /// A single entry exceeded the configured per-file size cap.
    #[error("size: entry {entry:?} is {attempted} bytes, over the {allowed}-byte limit")]
    FileTooLarge {
        /// The offending entry's path.
        entry: String,
        /// Bytes the entry actually contains (or claims to, via its header).
        attempted: u64,
        /// The configured per-file cap.
        allowed: u64,
    },

    /// The sum of extracted entry sizes exceeded the configured archive cap.
    #[error("size: archive total is at least {attempted} bytes, over the {allowed}-byte limit")]
    ArchiveTooLarge {
        /// Cumulative bytes seen so far when the cap was crossed.
        attempted: u64,
        /// The configured cumulative cap.
        allowed: u64,
    },

    /// The archive contained more entries than the configured cap.
    #[error("count: archive has at least {attempted} entries, over the {allowed}-entry limit")]
    TooManyEntries {
        /// Entries seen so far when the cap was crossed.
        attempted: u64,
        /// The configured entry-count cap.
        allowed: u64,
    },

    /// A symlink's target, resolved relative to its own location, would
    /// point outside the extraction root.
    #[error("symlink-containment: entry {entry:?} targets {target:?}, which escapes the extraction root")]
    SymlinkEscapesRoot {
        /// The symlink entry's path.
        entry: String,
        /// The symlink's raw target.
        target: String,
    },

    /// The archive could not be decoded (corrupt gzip stream, malformed tar
    /// header, truncated entry, ...).
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// Extraction was cancelled mid-stream via a `CancellationToken`.
    #[error("extraction cancelled")]
    Cancelled,

    /// A filesystem-abstraction operation failed while writing an entry.
    #[error(transparent)]
    Fs(#[from] crate::fs::FsError),

    /// An underlying I/O error while reading the archive itself.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
