//! A read-only [`File`] backed by HTTP range requests against a single URL.
//!
//! Every `read`/`read_at` is its own ranged GET; `position` is guarded by a
//! plain mutex so concurrent seeks and reads against the same handle don't
//! interleave, but the HTTP call itself happens without holding the lock.

use std::io::SeekFrom;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;

use crate::fs::{File, FileInfo, FsError, FsResult, ReadAt, Seekable};

/// A range-request-backed reader over one remote object.
pub struct RangeReader {
    client: Client,
    url: String,
    size: u64,
    position: Mutex<u64>,
}

impl RangeReader {
    /// Builds a reader for `url`, which must be `size` bytes long and
    /// support HTTP range requests (callers should check with
    /// [`super::range_probe::supports_range`] first).
    pub fn new(client: Client, url: impl Into<String>, size: u64) -> Self {
        RangeReader {
            client,
            url: url.into(),
            size,
            position: Mutex::new(0),
        }
    }

    /// The total size of the remote object.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fetches exactly the bytes in `start..start+len` (clamped to the
    /// object's size), independent of the handle's internal cursor.
    pub async fn fetch_range(&self, start: u64, len: u64) -> FsResult<Vec<u8>> {
        if len == 0 || start >= self.size {
            return Ok(Vec::new());
        }
        let end = (start + len - 1).min(self.size.saturating_sub(1));
        let range = format!("bytes={start}-{end}");
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, range)
            .send()
            .await
            .map_err(|e| FsError::Io(std::io::Error::other(format!("range GET {}: {e}", self.url))))?;
        if !resp.status().is_success() {
            return Err(FsError::Io(std::io::Error::other(format!(
                "range GET {} returned {}",
                self.url,
                resp.status()
            ))));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FsError::Io(std::io::Error::other(format!("read range body {}: {e}", self.url))))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl File for RangeReader {
    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let position = *self.position.lock();
        let data = self.fetch_range(position, buf.len() as u64).await?;
        buf[..data.len()].copy_from_slice(&data);
        *self.position.lock() = position + data.len() as u64;
        Ok(data.len())
    }

    async fn write(&mut self, _buf: &[u8]) -> FsResult<()> {
        Err(FsError::unsupported("write: range reader is read-only"))
    }

    async fn sync(&mut self) -> FsResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> FsResult<()> {
        Ok(())
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        Ok(FileInfo {
            name: self.url.clone(),
            is_dir: false,
            size: self.size,
            mod_time: None,
            mode: 0o644,
        })
    }

    fn as_seekable(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }

    fn as_read_at(&self) -> Option<&dyn ReadAt> {
        Some(self)
    }
}

#[async_trait]
impl Seekable for RangeReader {
    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let current = *self.position.lock();
        let new_pos = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => self.size as i64 + n,
            SeekFrom::Current(n) => current as i64 + n,
        };
        if new_pos < 0 {
            return Err(FsError::unsupported("seek: negative position"));
        }
        *self.position.lock() = new_pos as u64;
        Ok(new_pos as u64)
    }
}

#[async_trait]
impl ReadAt for RangeReader {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let data = self.fetch_range(offset, buf.len() as u64).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}
