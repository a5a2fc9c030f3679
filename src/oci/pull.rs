//! Pulling a bundle's manifest and first layer blob from a registry.

use oci_client::manifest::OciManifest;
use oci_client::secrets::RegistryAuth;
use tokio_util::sync::CancellationToken;

use crate::fs::Fs;

use super::error::{OciError, OciResult};
use super::push::{map_push_error, to_client_reference, BUNDLE_LAYER_MEDIA_TYPE};
use super::reference::Reference;

/// The manifest and digest pair returned by [`pull_manifest`].
pub struct PulledManifest {
    /// The parsed manifest.
    pub manifest: OciManifest,
    /// The manifest's own content digest, as reported by the registry.
    pub digest: String,
}

/// Fetches and parses `reference`'s manifest.
pub async fn pull_manifest(
    client: &oci_client::Client,
    reference: &Reference,
    auth: &RegistryAuth,
    cancel: &CancellationToken,
) -> OciResult<PulledManifest> {
    if cancel.is_cancelled() {
        return Err(OciError::Cancelled);
    }

    let image_ref = to_client_reference(reference)?;
    let (manifest, digest) = client
        .pull_manifest(&image_ref, auth)
        .await
        .map_err(|e| map_push_error(&reference.registry, e))?;
    Ok(PulledManifest { manifest, digest })
}

/// Pulls `reference`'s bundle layer (the first layer whose media type is
/// [`BUNDLE_LAYER_MEDIA_TYPE`], or simply the first layer if none match) and
/// writes it to `dest_path` on `dest`.
pub async fn pull_bundle(
    client: &oci_client::Client,
    reference: &Reference,
    auth: &RegistryAuth,
    dest: &dyn Fs,
    dest_path: &str,
    cancel: &CancellationToken,
) -> OciResult<()> {
    let pulled = pull_manifest(client, reference, auth, cancel).await?;
    let OciManifest::Image(image_manifest) = pulled.manifest else {
        return Err(OciError::Manifest("expected an image manifest, found an index".to_string()));
    };

    let descriptor = image_manifest
        .layers
        .iter()
        .find(|l| l.media_type == BUNDLE_LAYER_MEDIA_TYPE)
        .or_else(|| image_manifest.layers.first())
        .ok_or_else(|| OciError::Manifest("manifest has no layers".to_string()))?
        .clone();

    log::debug!(
        "oci: pulling bundle layer {} ({} bytes) from {}",
        descriptor.digest,
        descriptor.size,
        reference.to_string_lossy()
    );

    if cancel.is_cancelled() {
        return Err(OciError::Cancelled);
    }

    let image_ref = to_client_reference(reference)?;
    let mut data = Vec::with_capacity(descriptor.size.max(0) as usize);
    client
        .pull_blob(&image_ref, &descriptor, &mut data)
        .await
        .map_err(|e| map_push_error(&reference.registry, e))?;

    verify_digest(&data, &descriptor.digest)?;
    dest.write_file(dest_path, &data, 0o644).await?;
    Ok(())
}

fn verify_digest(data: &[u8], expected: &str) -> OciResult<()> {
    use sha2::{Digest, Sha256};
    let Some(hex) = expected.strip_prefix("sha256:") else {
        return Err(OciError::Manifest(format!("unsupported digest algorithm: {expected}")));
    };
    let actual = format!("{:x}", Sha256::digest(data));
    if actual != hex {
        return Err(OciError::Manifest(format!(
            "blob digest mismatch: expected {expected}, got sha256:{actual}"
        )));
    }
    Ok(())
}
