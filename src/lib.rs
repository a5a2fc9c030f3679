//! Content-addressed OCI bundle distribution.
//!
//! Pack a directory into a tar+gzip blob, push it to an OCI registry as a
//! bundle artifact, pull it back down, and extract it under a validator
//! chain that rejects path traversal, symlink escapes, and archive bombs —
//! or skip the round trip and pull selected files straight out of an
//! eStargz-formatted layer over HTTP range requests.
//!
//! Everything above [`fs::Fs`] (bundling, pushing, pulling, extracting) is
//! written against that one trait, so the same code works whether a bundle
//! is staged on the local disk, an in-memory tree, or an S3-compatible
//! object store.
//!
//! Start with [`client::Client`] for the common push/pull path; the
//! lower-level modules are public for callers who need to compose pieces
//! directly (a bare [`fs::Fs`] copy, a selective [`estargz::selective_pull`],
//! a standalone [`extract::Extractor`] over an archive from some other
//! source).
//!
//! Signature verification, registry-server implementations, and plugin
//! loading are out of scope (see `README.md`); the sentinel error variants
//! a future verifier would need are still exposed on [`error::Error`].

pub mod bundler;
pub mod client;
pub mod config;
pub mod error;
pub mod estargz;
pub mod extract;
pub mod fs;
pub mod logging;
pub mod oci;

pub use client::Client;
pub use error::{Error, Result};
