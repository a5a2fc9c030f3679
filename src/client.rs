//! Top-level orchestration tying `fs`, `oci`, `bundler`, `extract`, and
//! `estargz` together behind one handle (spec §6).
//!
//! [`Client`] is the entry point most callers reach for: it owns registry
//! auth/transport configuration and drives the bundle-directory → push and
//! pull → extract-directory round trips, leaving the lower-level pieces
//! directly accessible for callers who need finer control (a selective
//! eStargz pull, say, or a bare [`crate::fs::Fs`] copy).

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::bundler;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::extract::{ExtractOptions, ExtractReport, Extractor};
use crate::fs::Fs;
use crate::oci::{AuthConfig, Reference, RegistryClient};

/// A bundle-distribution client: one configured registry connection plus the
/// packing/extraction pipeline layered on top of it.
pub struct Client {
    registry: RegistryClient,
}

impl Client {
    /// Builds a client that authenticates to registries via `auth_config`.
    pub fn new(config: ClientConfig, auth_config: AuthConfig) -> Result<Self> {
        config.validate().map_err(|_| Error::Config("invalid client configuration".to_string()))?;
        let registry = RegistryClient::new(auth_config, config.registry_insecure)
            .with_spool_threshold(config.push_spool_threshold);
        Ok(Client { registry })
    }

    /// Packs everything under `source_root` on `source` and pushes it to
    /// `reference`. Returns the pushed manifest's digest.
    pub async fn push_directory(
        &self,
        source: &dyn Fs,
        source_root: &str,
        reference: &Reference,
        annotations: Option<HashMap<String, String>>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let blob = bundler::bundle_directory(source, source_root, cancel).await?;

        let temp_name = format!(".catalyst-bundle-push-{:x}.tar.gz", blob_fingerprint(&blob));
        source.write_file(&temp_name, &blob, 0o644).await?;

        let result = self.registry.push(reference, source, &temp_name, annotations, cancel).await;
        let _ = source.remove(&temp_name).await;

        Ok(result?)
    }

    /// Pulls `reference`'s bundle and extracts it under `dest_root` on
    /// `dest`, validating every entry per `extract_options`.
    pub async fn pull_directory(
        &self,
        reference: &Reference,
        dest: &dyn Fs,
        dest_root: &str,
        extract_options: ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<ExtractReport> {
        let temp_name = ".catalyst-bundle-pull.tar.gz";
        self.registry.pull(reference, dest, temp_name, cancel).await?;

        let blob = dest.read_file(temp_name).await;
        let _ = dest.remove(temp_name).await;
        let blob = blob?;

        let extractor = Extractor::new(extract_options);
        Ok(extractor.extract(&blob, dest, dest_root, cancel).await?)
    }

    /// Fetches just `reference`'s manifest, without pulling or extracting
    /// the blob.
    pub async fn pull_manifest(
        &self,
        reference: &Reference,
        cancel: &CancellationToken,
    ) -> Result<crate::oci::pull::PulledManifest> {
        Ok(self.registry.pull_manifest(reference, cancel).await?)
    }

    /// The underlying registry client, for callers who need operations this
    /// wrapper doesn't expose directly.
    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }
}

fn blob_fingerprint(data: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.len().hash(&mut hasher);
    data.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFs;

    #[tokio::test]
    async fn push_directory_cleans_up_temp_file_on_failure() {
        let source = MemoryFs::new();
        source.write_file("a.txt", b"hello", 0o644).await.unwrap();

        let client = Client::new(ClientConfig::default(), AuthConfig::Anonymous).unwrap();
        let reference = Reference::parse("127.0.0.1:1/does-not-exist/bundle:latest").unwrap();

        let result = client
            .push_directory(&source, ".", &reference, None, &CancellationToken::new())
            .await;
        assert!(result.is_err());

        let entries = source.read_dir(".").await.unwrap();
        assert!(
            entries.iter().all(|e| !e.name.starts_with(".catalyst-bundle-push-")),
            "temp staging blob was not cleaned up: {entries:?}"
        );
    }
}
