//! Crate-wide error taxonomy.
//!
//! Each subsystem (`fs`, `oci`, `extract`) defines its own error type close to
//! where it's produced; this module unifies them for [`crate::client::Client`]'s
//! public API so callers who don't care which subsystem failed can match a
//! single enum, while callers who do care can still match the nested variant.

use crate::extract::error::ExtractError;
use crate::fs::error::FsError;
use crate::oci::error::OciError;

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type returned by [`crate::client::Client`] operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A filesystem-abstraction operation failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// An OCI registry operation failed.
    #[error(transparent)]
    Oci(#[from] OciError),

    /// An archive extraction operation failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Configuration was invalid at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A signature was looked for but none was attached to the artifact.
    ///
    /// Signature verification itself is out of scope for this crate (see
    /// spec §1); this sentinel exists so that a caller wiring in their own
    /// verifier can match on it.
    #[error("signature not found")]
    SignatureNotFound,

    /// An attached signature failed cryptographic verification.
    #[error("signature invalid")]
    SignatureInvalid,

    /// A signature verified cryptographically but the signer is not trusted.
    #[error("untrusted signer")]
    UntrustedSigner,

    /// Rekor transparency-log verification failed.
    #[error("rekor verification failed")]
    RekorVerificationFailed,

    /// The signing certificate has expired.
    #[error("certificate expired")]
    CertificateExpired,

    /// Annotations attached to the artifact did not match the expected policy.
    #[error("invalid annotations")]
    InvalidAnnotations,
}
