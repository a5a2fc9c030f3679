//! A thin wrapper over [`oci_client`] adding our own auth resolution,
//! process-global transport/credential caching, and a streaming-leaning
//! push/pull path (spec §4.3).

pub mod auth;
pub mod error;
pub mod pull;
pub mod push;
pub mod reference;
mod transport;

use std::collections::HashMap;

use oci_client::secrets::RegistryAuth;
use tokio_util::sync::CancellationToken;

use crate::fs::Fs;

pub use auth::{AuthConfig, CredentialResolver};
pub use error::{OciError, OciResult};
pub use reference::{Reference, Selector};
pub use transport::TransportKey;

/// A registry-facing handle bundling auth configuration and transport
/// caching behind [`Reference`]-scoped operations.
pub struct RegistryClient {
    auth_config: AuthConfig,
    insecure: bool,
    spool_threshold: usize,
}

impl RegistryClient {
    /// Builds a client that resolves credentials via `auth_config`. `insecure`
    /// allows plaintext HTTP to the target registry, for local/test registries.
    pub fn new(auth_config: AuthConfig, insecure: bool) -> Self {
        RegistryClient {
            auth_config,
            insecure,
            spool_threshold: push::DEFAULT_SPOOL_THRESHOLD,
        }
    }

    /// Overrides the in-memory buffering threshold used by [`Self::push`]
    /// before it spools through a temp file (default 64 MiB).
    pub fn with_spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    fn resolve(&self, reference: &Reference) -> OciResult<(std::sync::Arc<oci_client::Client>, RegistryAuth)> {
        let client = transport::client_for(TransportKey {
            registry: reference.registry.clone(),
            insecure: self.insecure,
        });
        let auth = auth::resolve(&self.auth_config, &reference.registry)?;
        Ok((client, auth))
    }

    /// Pushes the bundle at `path` on `source` to `reference`.
    pub async fn push(
        &self,
        reference: &Reference,
        source: &dyn Fs,
        path: &str,
        annotations: Option<HashMap<String, String>>,
        cancel: &CancellationToken,
    ) -> OciResult<String> {
        let (client, auth) = self.resolve(reference)?;
        push::push_bundle(&client, reference, &auth, source, path, self.spool_threshold, annotations, cancel).await
    }

    /// Pulls `reference`'s bundle into `dest_path` on `dest`.
    pub async fn pull(
        &self,
        reference: &Reference,
        dest: &dyn Fs,
        dest_path: &str,
        cancel: &CancellationToken,
    ) -> OciResult<()> {
        let (client, auth) = self.resolve(reference)?;
        pull::pull_bundle(&client, reference, &auth, dest, dest_path, cancel).await
    }

    /// Fetches just `reference`'s manifest, without pulling the blob.
    pub async fn pull_manifest(
        &self,
        reference: &Reference,
        cancel: &CancellationToken,
    ) -> OciResult<pull::PulledManifest> {
        let (client, auth) = self.resolve(reference)?;
        pull::pull_manifest(&client, reference, &auth, cancel).await
    }
}
