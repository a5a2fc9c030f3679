//! Local-disk [`Fs`] backend: delegates straight to `tokio::fs`/`std::fs`,
//! rooted at a directory on the host filesystem.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use log::{debug, warn};

use super::{
    normalize_path, DirEntry, File, FileInfo, Fs, FsError, FsResult, FsType, MetadataCapability,
    OpenFlags, ReadAt, Seekable, SymlinkCapability, TempFileCapability, WalkAction, WalkFn,
};

/// A filesystem rooted at a directory on the host's local disk.
///
/// Every path passed to this backend's methods is normalized and joined
/// under `root` before touching the OS, so a caller cannot escape `root` via
/// `..` components (see [`super::join_path`]).
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Roots a new [`LocalFs`] at `root`. Does not require `root` to exist
    /// yet; operations against a missing root simply fail not-found.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFs { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let normalized = normalize_path(name);
        if normalized == "." {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }
}

fn map_io_err(op: &'static str, path: &Path, err: std::io::Error) -> FsError {
    match err.kind() {
        std::io::ErrorKind::NotFound => FsError::not_found(op, path.display().to_string()),
        std::io::ErrorKind::AlreadyExists => {
            FsError::already_exists(op, path.display().to_string())
        }
        std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
            op,
            path: path.display().to_string(),
        },
        _ => FsError::Io(err),
    }
}

fn to_file_info(name: String, meta: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        name,
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mod_time: meta.modified().ok(),
        mode: file_mode(meta),
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[async_trait]
impl Fs for LocalFs {
    fn fs_type(&self) -> FsType {
        FsType::Local
    }

    async fn open(&self, name: &str) -> FsResult<Box<dyn File>> {
        self.open_file(name, OpenFlags::READ, 0).await
    }

    async fn stat(&self, name: &str) -> FsResult<FileInfo> {
        let path = self.resolve(name);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io_err("stat", &path, e))?;
        Ok(to_file_info(name.to_string(), &meta))
    }

    async fn read_dir(&self, name: &str) -> FsResult<Vec<DirEntry>> {
        let path = self.resolve(name);
        let mut rd = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| map_io_err("read_dir", &path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| map_io_err("read_dir", &path, e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| map_io_err("read_dir", &entry.path(), e))?;
            entries.push(to_file_info(entry.file_name().to_string_lossy().into_owned(), &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_file(&self, name: &str, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        let path = self.resolve(name);
        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(flags.contains(OpenFlags::READ) || !flags.contains(OpenFlags::WRITE));
        opts.write(flags.contains(OpenFlags::WRITE));
        opts.create(flags.contains(OpenFlags::CREATE));
        opts.truncate(flags.contains(OpenFlags::TRUNCATE));
        opts.append(flags.contains(OpenFlags::APPEND));
        opts.create_new(flags.contains(OpenFlags::EXCL));
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(perm);
        }
        #[cfg(not(unix))]
        let _ = perm;

        let file = opts
            .open(&path)
            .await
            .map_err(|e| map_io_err("open", &path, e))?;
        Ok(Box::new(LocalFile {
            inner: Some(file),
            sync_on_write: flags.contains(OpenFlags::SYNC),
        }))
    }

    async fn mkdir(&self, name: &str, perm: u32) -> FsResult<()> {
        let path = self.resolve(name);
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| map_io_err("mkdir", &path, e))?;
        set_mode(&path, perm).await;
        Ok(())
    }

    async fn mkdir_all(&self, name: &str, perm: u32) -> FsResult<()> {
        let path = self.resolve(name);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| map_io_err("mkdir_all", &path, e))?;
        set_mode(&path, perm).await;
        Ok(())
    }

    async fn remove(&self, name: &str) -> FsResult<()> {
        let path = self.resolve(name);
        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| map_io_err("remove", &path, e))?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&path)
                .await
                .map_err(|e| map_io_err("remove", &path, e))
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| map_io_err("remove", &path, e))
        }
    }

    async fn remove_all(&self, path: &str) -> FsResult<()> {
        let resolved = self.resolve(path);
        match tokio::fs::remove_dir_all(&resolved).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FsError::not_found("remove_all", resolved.display().to_string()))
            }
            Err(e) => {
                // Could be a plain file rather than a directory.
                match tokio::fs::remove_file(&resolved).await {
                    Ok(()) => Ok(()),
                    Err(_) => Err(map_io_err("remove_all", &resolved, e)),
                }
            }
        }
    }

    async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old_path = self.resolve(old);
        let new_path = self.resolve(new);
        if let Some(parent) = new_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        tokio::fs::rename(&old_path, &new_path)
            .await
            .map_err(|e| map_io_err("rename", &old_path, e))
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
        Ok(Box::new(LocalFs::new(self.resolve(dir))))
    }

    fn as_metadata(&self) -> Option<&dyn MetadataCapability> {
        Some(self)
    }

    fn as_symlinks(&self) -> Option<&dyn SymlinkCapability> {
        Some(self)
    }

    fn as_temp_file(&self) -> Option<&dyn TempFileCapability> {
        Some(self)
    }
}

async fn set_mode(path: &Path, perm: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(perm)).await
        {
            warn!("local fs: failed to set mode {perm:o} on {}: {e}", path.display());
        }
    }
    #[cfg(not(unix))]
    let _ = (path, perm);
}

#[async_trait]
impl MetadataCapability for LocalFs {
    async fn lstat(&self, name: &str) -> FsResult<FileInfo> {
        let path = self.resolve(name);
        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| map_io_err("lstat", &path, e))?;
        Ok(to_file_info(name.to_string(), &meta))
    }

    async fn chmod(&self, name: &str, mode: u32) -> FsResult<()> {
        let path = self.resolve(name);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| map_io_err("chmod", &path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            Err(FsError::unsupported("chmod"))
        }
    }

    async fn chtimes(&self, name: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let path = self.resolve(name);
        let file = tokio::fs::File::options()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| map_io_err("chtimes", &path, e))?;
        let std_file = file.into_std().await;
        std_file
            .set_times(
                std::fs::FileTimes::new()
                    .set_accessed(atime)
                    .set_modified(mtime),
            )
            .map_err(|e| map_io_err("chtimes", &path, e))
    }
}

#[async_trait]
impl SymlinkCapability for LocalFs {
    async fn symlink(&self, target: &str, link_name: &str) -> FsResult<()> {
        let link_path = self.resolve(link_name);
        #[cfg(unix)]
        {
            tokio::fs::symlink(target, &link_path)
                .await
                .map_err(|e| map_io_err("symlink", &link_path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Err(FsError::unsupported("symlink"))
        }
    }

    async fn read_link(&self, name: &str) -> FsResult<String> {
        let path = self.resolve(name);
        let target = tokio::fs::read_link(&path)
            .await
            .map_err(|e| map_io_err("read_link", &path, e))?;
        Ok(target.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl TempFileCapability for LocalFs {
    async fn temp_file(&self, dir: &str, pattern: &str) -> FsResult<(Box<dyn File>, String)> {
        let dir_path = self.resolve(dir);
        tokio::fs::create_dir_all(&dir_path)
            .await
            .map_err(|e| map_io_err("temp_file", &dir_path, e))?;
        let unique = format!("{pattern}.{}", uuid_like());
        let full = dir_path.join(&unique);
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| map_io_err("temp_file", &full, e))?;
        debug!("local fs: created temp file {}", full.display());
        let rel = if dir == "." || dir.is_empty() {
            unique.clone()
        } else {
            format!("{dir}/{unique}")
        };
        Ok((
            Box::new(LocalFile {
                inner: Some(file),
                sync_on_write: false,
            }),
            rel,
        ))
    }
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}

struct LocalFile {
    inner: Option<tokio::fs::File>,
    sync_on_write: bool,
}

impl LocalFile {
    fn handle(&mut self) -> FsResult<&mut tokio::fs::File> {
        self.inner.as_mut().ok_or(FsError::Closed)
    }
}

#[async_trait]
impl File for LocalFile {
    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        use tokio::io::AsyncReadExt;
        Ok(self.handle()?.read(buf).await?)
    }

    async fn write(&mut self, buf: &[u8]) -> FsResult<()> {
        use tokio::io::AsyncWriteExt;
        let sync = self.sync_on_write;
        let handle = self.handle()?;
        handle.write_all(buf).await?;
        if sync {
            handle.sync_all().await?;
        }
        Ok(())
    }

    async fn sync(&mut self) -> FsResult<()> {
        Ok(self.handle()?.sync_all().await?)
    }

    async fn close(&mut self) -> FsResult<()> {
        if let Some(mut file) = self.inner.take() {
            use tokio::io::AsyncWriteExt;
            file.flush().await?;
        }
        Ok(())
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        let file = self.inner.as_ref().ok_or(FsError::Closed)?;
        let meta = file.metadata().await?;
        Ok(to_file_info(String::new(), &meta))
    }

    fn as_seekable(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }

    fn as_read_at(&self) -> Option<&dyn ReadAt> {
        None
    }
}

#[async_trait]
impl Seekable for LocalFile {
    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        use tokio::io::AsyncSeekExt;
        Ok(self.handle()?.seek(pos).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, LocalFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, fs) = fixture().await;
        fs.write_file("a/b.txt", b"hello", 0o644).await.unwrap();
        let data = fs.read_file("a/b.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn remove_missing_is_not_found() {
        let (_dir, fs) = fixture().await;
        let err = fs.remove("nope.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn exists_distinguishes_absent_from_present() {
        let (_dir, fs) = fixture().await;
        assert_eq!(fs.exists("missing").await.unwrap(), false);
        fs.write_file("present", b"x", 0o644).await.unwrap();
        assert_eq!(fs.exists("present").await.unwrap(), true);
    }

    #[tokio::test]
    async fn read_dir_is_sorted() {
        let (_dir, fs) = fixture().await;
        fs.write_file("z.txt", b"1", 0o644).await.unwrap();
        fs.write_file("a.txt", b"2", 0o644).await.unwrap();
        let entries = fs.read_dir(".").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["a.txt", "z.txt"]);
    }

    #[tokio::test]
    async fn rename_moves_file() {
        let (_dir, fs) = fixture().await;
        fs.write_file("src.txt", b"data", 0o644).await.unwrap();
        fs.rename("src.txt", "dst/dst.txt").await.unwrap();
        assert_eq!(fs.exists("src.txt").await.unwrap(), false);
        assert_eq!(fs.read_file("dst/dst.txt").await.unwrap(), b"data");
    }
}
