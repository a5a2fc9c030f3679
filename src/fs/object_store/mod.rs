//! S3-compatible object-store [`Fs`] backend.
//!
//! Directories are virtual: there is no `Mkdir` to perform on the remote
//! side, only path validation, and `ReadDir` synthesizes directory entries
//! from `ListObjectsV2`'s `CommonPrefixes` under a `/` delimiter. `Remove`
//! and `RemoveAll` are idempotent — deleting an already-missing key is not
//! an error here, unlike [`super::local::LocalFs`] and
//! [`super::memory::MemoryFs`] — and `Rename` is a non-atomic
//! bounded-concurrency copy+delete. These divergences from local/memory
//! semantics are intentional (spec §4.1, §9), not bugs.

pub mod file;
pub mod key;
pub mod rename;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use log::{debug, trace};

use self::file::{ReadHandle, WriteHandle};
use self::key::{basename, key_as_dir_prefix, object_key, strip_prefix};

use super::{
    DirEntry, File, FileInfo, Fs, FsError, FsResult, FsType, OpenFlags, WalkAction, WalkFn,
};

/// Tuning knobs for an [`ObjectStoreFs`], mirroring `config::ObjectStoreConfig`.
#[derive(Debug, Clone)]
pub struct ObjectStoreOptions {
    /// Bytes buffered before a write switches from a single `PutObject` to a
    /// multipart upload. Default 5 MiB (spec §4.2), the S3 minimum part size.
    pub buffer_threshold: usize,
    /// Max concurrent copy+delete pairs during a directory rename. Default 10.
    pub rename_workers: usize,
}

impl Default for ObjectStoreOptions {
    fn default() -> Self {
        ObjectStoreOptions {
            buffer_threshold: 5 * 1024 * 1024,
            rename_workers: rename::DEFAULT_WORKERS,
        }
    }
}

/// A filesystem rooted at a prefix within an S3-compatible bucket.
#[derive(Clone)]
pub struct ObjectStoreFs {
    client: Client,
    bucket: String,
    prefix: String,
    options: ObjectStoreOptions,
}

impl ObjectStoreFs {
    /// Roots a new [`ObjectStoreFs`] at `prefix` within `bucket`, using an
    /// already-configured `aws-sdk-s3` client (region, endpoint, credentials,
    /// and path-style addressing are all set up by the caller — see
    /// `config::ObjectStoreConfig` for the usual construction path).
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>, options: ObjectStoreOptions) -> Self {
        ObjectStoreFs {
            client,
            bucket: bucket.into(),
            prefix: super::normalize_path(&prefix.into()).trim_start_matches("./").to_string(),
            options,
        }
    }

    fn key(&self, name: &str) -> String {
        object_key(&self.prefix, name)
    }
}

#[async_trait]
impl Fs for ObjectStoreFs {
    fn fs_type(&self) -> FsType {
        FsType::Remote
    }

    async fn open(&self, name: &str) -> FsResult<Box<dyn File>> {
        self.open_file(name, OpenFlags::READ, 0).await
    }

    async fn stat(&self, name: &str) -> FsResult<FileInfo> {
        let key = self.key(name);
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        match resp {
            Ok(head) => Ok(FileInfo {
                name: name.to_string(),
                is_dir: false,
                size: head.content_length().unwrap_or(0).max(0) as u64,
                mod_time: head.last_modified().and_then(|t| {
                    std::time::SystemTime::UNIX_EPOCH
                        .checked_add(std::time::Duration::from_secs_f64(t.as_secs_f64().max(0.0)))
                }),
                mode: 0o644,
            }),
            Err(e) => {
                if is_not_found(&e) {
                    // Might be a virtual directory: confirmed present if any
                    // key exists under it.
                    let dir_prefix = key_as_dir_prefix(&key);
                    let listing = self
                        .client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(&dir_prefix)
                        .max_keys(1)
                        .send()
                        .await
                        .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;
                    if listing.key_count().unwrap_or(0) > 0 {
                        Ok(FileInfo {
                            name: name.to_string(),
                            is_dir: true,
                            size: 0,
                            mod_time: None,
                            mode: 0o755,
                        })
                    } else {
                        Err(FsError::not_found("stat", name.to_string()))
                    }
                } else {
                    Err(FsError::Io(std::io::Error::other(e.to_string())))
                }
            }
        }
    }

    async fn read_dir(&self, name: &str) -> FsResult<Vec<DirEntry>> {
        let key = self.key(name);
        let dir_prefix = key_as_dir_prefix(&key);
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&dir_prefix)
                .delimiter("/");
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;

            for common in resp.common_prefixes() {
                if let Some(p) = common.prefix() {
                    entries.push(FileInfo {
                        name: basename(p).to_string(),
                        is_dir: true,
                        size: 0,
                        mod_time: None,
                        mode: 0o755,
                    });
                }
            }
            for obj in resp.contents() {
                let Some(object_key) = obj.key() else { continue };
                let rel = strip_prefix(object_key, &dir_prefix.trim_end_matches('/').to_string());
                if rel.is_empty() {
                    continue;
                }
                entries.push(FileInfo {
                    name: basename(object_key).to_string(),
                    is_dir: false,
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    mod_time: obj.last_modified().and_then(|t| {
                        std::time::SystemTime::UNIX_EPOCH
                            .checked_add(std::time::Duration::from_secs_f64(t.as_secs_f64().max(0.0)))
                    }),
                    mode: 0o644,
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        if entries.is_empty() && !self.exists(name).await? {
            return Err(FsError::not_found("read_dir", name.to_string()));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_file(&self, name: &str, flags: OpenFlags, _perm: u32) -> FsResult<Box<dyn File>> {
        if flags.intersects(OpenFlags::APPEND | OpenFlags::EXCL | OpenFlags::SYNC) {
            return Err(FsError::unsupported("open_file: flag unsupported on object-store backend"));
        }
        if flags.contains(OpenFlags::READ) && flags.contains(OpenFlags::WRITE) {
            return Err(FsError::unsupported("open_file: O_RDWR unsupported on object-store backend"));
        }
        let key = self.key(name);
        if flags.contains(OpenFlags::WRITE) {
            if flags.contains(OpenFlags::EXCL) && self.exists(name).await? {
                return Err(FsError::already_exists("open_file", name.to_string()));
            }
            Ok(Box::new(WriteHandle::new(
                self.client.clone(),
                self.bucket.clone(),
                key,
                self.options.buffer_threshold,
            )))
        } else {
            let info = self.stat(name).await?;
            if info.is_dir {
                return Err(FsError::unsupported("open_file: target is a directory"));
            }
            Ok(Box::new(ReadHandle::new(self.client.clone(), self.bucket.clone(), key, info.size)))
        }
    }

    async fn mkdir(&self, name: &str, _perm: u32) -> FsResult<()> {
        let _ = self.key(name);
        debug!("object_store: mkdir is a no-op (virtual directories)");
        Ok(())
    }

    async fn mkdir_all(&self, name: &str, perm: u32) -> FsResult<()> {
        self.mkdir(name, perm).await
    }

    async fn remove(&self, name: &str) -> FsResult<()> {
        let key = self.key(name);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    async fn remove_all(&self, path: &str) -> FsResult<()> {
        let key = self.key(path);
        let dir_prefix = key_as_dir_prefix(&key);
        let mut continuation: Option<String> = None;
        let mut deleted_any = false;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&dir_prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;
            for obj in resp.contents() {
                if let Some(k) = obj.key() {
                    trace!("object_store: deleting {k} as part of remove_all({path})");
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(k)
                        .send()
                        .await
                        .map_err(|e| FsError::Io(std::io::Error::other(e.to_string())))?;
                    deleted_any = true;
                }
            }
            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        // Also remove a possible exact-key object (a "file", not a "directory").
        let _ = self.remove(path).await;
        let _ = deleted_any;
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old_key = self.key(old);
        let new_key = self.key(new);
        rename::rename(&self.client, &self.bucket, &old_key, &new_key, self.options.rename_workers).await
    }

    async fn walk(&self, root: &str, f: &mut dyn WalkFn) -> FsResult<()> {
        let mut stack = vec![root.to_string()];
        while let Some(dir) = stack.pop() {
            let mut entries = self.read_dir(&dir).await?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                let child_path = if dir == "." || dir.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{dir}/{}", entry.name)
                };
                match f(&child_path, &entry)? {
                    WalkAction::Stop => return Ok(()),
                    WalkAction::SkipDir => continue,
                    WalkAction::Continue => {
                        if entry.is_dir {
                            stack.push(child_path);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn chroot(&self, dir: &str) -> FsResult<Box<dyn Fs>> {
        Ok(Box::new(ObjectStoreFs {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            prefix: self.key(dir),
            options: self.options.clone(),
        }))
    }
}

fn is_not_found(err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>) -> bool {
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(e) if e.err().is_not_found()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_spec() {
        let opts = ObjectStoreOptions::default();
        assert_eq!(opts.buffer_threshold, 5 * 1024 * 1024);
        assert_eq!(opts.rename_workers, 10);
    }
}
