//! Non-atomic rename for the object-store backend: a bounded-concurrency
//! copy-then-delete over every key under the source prefix.
//!
//! S3 has no rename primitive, so this is inherently non-atomic: a failure
//! partway through leaves some keys copied to the destination and not yet
//! deleted from the source. This is documented contract (spec §4.1, §9), not
//! a defect — callers that need atomicity should rename within a single key
//! (object-store backends can do that atomically via `CopyObject` +
//! `DeleteObject` of one key) or avoid directory-wide renames.

use aws_sdk_s3::Client;
use futures::stream::{self, TryStreamExt};
use log::{debug, warn};

use crate::fs::{FsError, FsResult};

use super::key::strip_prefix;

/// Default number of concurrent copy+delete pairs (spec §4.2).
pub const DEFAULT_WORKERS: usize = 10;

/// Renames everything under `old_key` (a single object, or every object
/// under `old_key/` if no object exists at that exact key) to the
/// corresponding path under `new_key`.
pub async fn rename(
    client: &Client,
    bucket: &str,
    old_key: &str,
    new_key: &str,
    workers: usize,
) -> FsResult<()> {
    let pairs = plan(client, bucket, old_key, new_key).await?;
    if pairs.is_empty() {
        return Err(FsError::not_found("rename", old_key.to_string()));
    }
    debug!(
        "object_store: renaming {} key(s) from {old_key:?} to {new_key:?} with {workers} workers",
        pairs.len()
    );

    stream::iter(pairs.into_iter().map(Ok::<_, FsError>))
        .try_for_each_concurrent(Some(workers.max(1)), |(src, dst)| {
            let client = client.clone();
            let bucket = bucket.to_string();
            async move { copy_then_delete(&client, &bucket, &src, &dst).await }
        })
        .await
}

async fn plan(
    client: &Client,
    bucket: &str,
    old_key: &str,
    new_key: &str,
) -> FsResult<Vec<(String, String)>> {
    let head = client.head_object().bucket(bucket).key(old_key).send().await;
    if head.is_ok() {
        return Ok(vec![(old_key.to_string(), new_key.to_string())]);
    }

    let dir_prefix = format!("{old_key}/");
    let mut pairs = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let mut req = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&dir_prefix);
        if let Some(token) = continuation.take() {
            req = req.continuation_token(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;
        for obj in resp.contents() {
            let Some(src_key) = obj.key() else { continue };
            let suffix = strip_prefix(src_key, old_key);
            pairs.push((src_key.to_string(), format!("{new_key}/{suffix}")));
        }
        if resp.is_truncated().unwrap_or(false) {
            continuation = resp.next_continuation_token().map(str::to_string);
        } else {
            break;
        }
    }
    Ok(pairs)
}

async fn copy_then_delete(client: &Client, bucket: &str, src: &str, dst: &str) -> FsResult<()> {
    let copy_source = encode_copy_source(bucket, src);
    client
        .copy_object()
        .bucket(bucket)
        .copy_source(copy_source)
        .key(dst)
        .send()
        .await
        .map_err(|e| FsError::Io(std::io::Error::other(format!("copy {src} -> {dst}: {e}"))))?;

    client
        .delete_object()
        .bucket(bucket)
        .key(src)
        .send()
        .await
        .map_err(|e| {
            warn!("object_store: copied {src} to {dst} but failed to delete source: {e}");
            FsError::Io(std::io::Error::other(format!("delete {src} after copy: {e}")))
        })?;
    Ok(())
}

const COPY_SOURCE_ESCAPE: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_copy_source(bucket: &str, key: &str) -> String {
    percent_encoding::utf8_percent_encode(&format!("{bucket}/{key}"), &COPY_SOURCE_ESCAPE).to_string()
}
