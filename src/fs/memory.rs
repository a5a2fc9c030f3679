//! In-memory [`Fs`] backend: a process-local tree of nodes, useful for tests
//! and for staging a bundle before it is pushed or extracted elsewhere.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    normalize_path, DirEntry, File, FileInfo, Fs, FsError, FsResult, FsType, MetadataCapability,
    OpenFlags, ReadAt, Seekable, WalkAction, WalkFn,
};

#[derive(Debug, Clone)]
enum Node {
    Dir {
        children: BTreeMap<String, Node>,
        mode: u32,
        mod_time: SystemTime,
    },
    File {
        data: Vec<u8>,
        mode: u32,
        mod_time: SystemTime,
    },
}

impl Node {
    fn new_dir(mode: u32) -> Self {
        Node::Dir {
            children: BTreeMap::new(),
            mode,
            mod_time: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn size(&self) -> u64 {
        match self {
            Node::File { data, .. } => data.len() as u64,
            Node::Dir { .. } => 0,
        }
    }

    fn mode(&self) -> u32 {
        match self {
            Node::File { mode, .. } | Node::Dir { mode, .. } => *mode,
        }
    }

    fn mod_time(&self) -> SystemTime {
        match self {
            Node::File { mod_time, .. } | Node::Dir { mod_time, .. } => *mod_time,
        }
    }
}

/// An in-memory, process-local filesystem tree.
///
/// Shares its tree via `Arc` so a [`MemoryFs::chroot`] subview and its parent
/// observe each other's writes, matching how a chroot of [`super::local::LocalFs`]
/// is simply a different view of the same disk.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    root: Arc<Mutex<Node>>,
    prefix: String,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Creates an empty in-memory tree.
    pub fn new() -> Self {
        MemoryFs {
            root: Arc::new(Mutex::new(Node::new_dir(0o755))),
            prefix: String::new(),
        }
    }

    fn full_path(&self, name: &str) -> String {
        super::join_path(&self.prefix, name)
    }

    fn components(path: &str) -> Vec<&str> {
        if path == "." {
            Vec::new()
        } else {
            path.split('/').collect()
        }
    }

    fn lookup<'a>(root: &'a Node, components: &[&str]) -> Option<&'a Node> {
        let mut cur = root;
        for part in components {
            match cur {
                Node::Dir { children, .. } => cur = children.get(*part)?,
                Node::File { .. } => return None,
            }
        }
        Some(cur)
    }

    fn lookup_mut<'a>(root: &'a mut Node, components: &[&str]) -> Option<&'a mut Node> {
        let mut cur = root;
        for part in components {
            match cur {
                Node::Dir { children, .. } => cur = children.get_mut(*part)?,
                Node::File { .. } => return None,
            }
        }
        Some(cur)
    }

    fn ensure_dirs(root: &mut Node, components: &[&str], mode: u32) -> FsResult<()> {
        let mut cur = root;
        for part in components {
            let Node::Dir { children, .. } = cur else {
                return Err(FsError::unsupported("mkdir_all: path component is a file"));
            };
            cur = children
                .entry(part.to_string())
                .or_insert_with(|| Node::new_dir(mode));
        }
        Ok(())
    }

    fn to_file_info(name: String, node: &Node) -> FileInfo {
        FileInfo {
            name,
            is_dir: node.is_dir(),
            size: node.size(),
            mod_time: Some(node.mod_time()),
            mode: node.mode(),
        }
    }
}

#[async_trait]
impl Fs for MemoryFs {
    fn fs_type(&self) -> FsType {
        FsType::Memory
    }

    async fn open(&self, name: &str) -> FsResult<Box<dyn File>> {
        self.open_file(name, OpenFlags::READ, 0).await
    }

    async fn stat(&self, name: &str) -> FsResult<FileInfo> {
        let path = self.full_path(name);
        let components = Self::components(&path);
        let root = self.root.lock();
        let node = Self::lookup(&root, &components).ok_or_else(|| FsError::not_found("stat", path))?;
        Ok(Self::to_file_info(name.to_string(), node))
    }

    async fn read_dir(&self, name: &str) -> FsResult<Vec<DirEntry>> {
        let path = self.full_path(name);
        let components = Self::components(&path);
        let root = self.root.lock();
        let node = Self::lookup(&root, &components).ok_or_else(|| FsError::not_found("read_dir", path.clone()))?;
        let Node::Dir { children, .. } = node else {
            return Err(FsError::unsupported("read_dir: not a directory"));
        };
        Ok(children
            .iter()
            .map(|(name, node)| Self::to_file_info(name.clone(), node))
            .collect())
    }

    async fn open_file(&self, name: &str, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        let path = self.full_path(name);
        let components: Vec<String> = Self::components(&path).into_iter().map(String::from).collect();

        if flags.contains(OpenFlags::WRITE) {
            let (parent, leaf) = components
                .split_last()
                .map(|(leaf, parent)| (parent, leaf.clone()))
                .ok_or_else(|| FsError::unsupported("open_file: cannot write to root"))?;
            let mut root = self.root.lock();
            Self::ensure_dirs(&mut root, &parent.iter().map(String::as_str).collect::<Vec<_>>(), 0o755)?;
            let parent_node = Self::lookup_mut(&mut root, &parent.iter().map(String::as_str).collect::<Vec<_>>())
                .ok_or_else(|| FsError::not_found("open_file", path.clone()))?;
            let Node::Dir { children, .. } = parent_node else {
                return Err(FsError::unsupported("open_file: parent is not a directory"));
            };

            if flags.contains(OpenFlags::EXCL) && children.contains_key(&leaf) {
                return Err(FsError::already_exists("open_file", path));
            }

            let existing = children.get(&leaf);
            let data = if flags.contains(OpenFlags::TRUNCATE) || existing.is_none() {
                Vec::new()
            } else if let Some(Node::File { data, .. }) = existing {
                data.clone()
            } else {
                return Err(FsError::unsupported("open_file: target is a directory"));
            };
            let offset = if flags.contains(OpenFlags::APPEND) {
                data.len()
            } else {
                0
            };
            children.insert(
                leaf,
                Node::File {
                    data: data.clone(),
                    mode: perm,
                    mod_time: SystemTime::now(),
                },
            );
            Ok(Box::new(MemoryFile {
                root: Arc::clone(&self.root),
                path: components,
                cursor: offset,
                buffer: data,
                append: flags.contains(OpenFlags::APPEND),
                closed: false,
            }))
        } else {
            let root = self.root.lock();
            let node = Self::lookup(&root, &components.iter().map(String::as_str).collect::<Vec<_>>())
                .ok_or_else(|| FsError::not_found("open_file", path.clone()))?;
            let Node::File { data, .. } = node else {
                return Err(FsError::unsupported("open_file: target is a directory"));
            };
            Ok(Box::new(MemoryFile {
                root: Arc::clone(&self.root),
                path: components,
                cursor: 0,
                buffer: data.clone(),
                append: false,
                closed: false,
            }))
        }
    }

    async fn mkdir(&self, name: &str, perm: u32) -> FsResult<()> {
        let path = self.full_path(name);
        let components: Vec<&str> = Self::components(&path);
        let (leaf, parent) = components
            .split_last()
            .ok_or_else(|| FsError::already_exists("mkdir", path.clone()))?;
        let mut root = self.root.lock();
        let parent_node =
            Self::lookup_mut(&mut root, parent).ok_or_else(|| FsError::not_found("mkdir", path.clone()))?;
        let Node::Dir { children, .. } = parent_node else {
            return Err(FsError::unsupported("mkdir: parent is not a directory"));
        };
        if children.contains_key(*leaf) {
            return Err(FsError::already_exists("mkdir", path));
        }
        children.insert(leaf.to_string(), Node::new_dir(perm));
        Ok(())
    }

    async fn mkdir_all(&self, name: &str, perm: u32) -> FsResult<()> {
        let path = self.full_path(name);
        let components = Self::components(&path);
        let mut root = self.root.lock();
        Self::ensure_dirs(&mut root, &components, perm)
    }

    async fn remove(&self, name: &str) -> FsResult<()> {
        let path = self.full_path(name);
        let components: Vec<&str> = Self::components(&path);
        let (leaf, parent) = components
            .split_last()
            .ok_or_else(|| FsError::unsupported("remove: cannot remove root"))?;
        let mut root = self.root.lock();
        let parent_node =
            Self::lookup_mut(&mut root, parent).ok_or_else(|| FsError::not_found("remove", path.clone()))?;
        let Node::Dir { children, .. } = parent_node else {
            return Err(FsError::not_found("remove", path));
        };
        if let Some(Node::Dir { children: grandchildren, .. }) = children.get(*leaf) {
            if !grandchildren.is_empty() {
                return Err(FsError::unsupported("remove: directory not empty"));
            }
        }
        children
            .remove(*leaf)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found("remove", path))
    }

    async fn remove_all(&self, path: &str) -> FsResult<()> {
        let full = self.full_path(path);
        let components: Vec<&str> = Self::components(&full);
        let mut root = self.root.lock();
        let Some((leaf, parent)) = components.split_last() else {
            let Node::Dir { children, .. } = &mut *root else {
                unreachable!()
            };
            children.clear();
            return Ok(());
        };
        let parent_node =
            Self::lookup_mut(&mut root, parent).ok_or_else(|| FsError::not_found("remove_all", full.clone()))?;
        let Node::Dir { children, .. } = parent_node else {
            return Err(FsError::not_found("remove_all", full));
        };
        children
            .remove(*leaf)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found("remove_all", full))
    }

    async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old_path = self.full_path(old);
        let new_path = self.full_path(new);
        let old_components: Vec<&str> = Self::components(&old_path);
        let new_components: Vec<&str> = Self::components(&new_path);

        let mut root = self.root.lock();
        let (old_leaf, old_parent) = old_components
            .split_last()
            .ok_or_else(|| FsError::unsupported("rename: cannot rename root"))?;
        let old_parent_node = Self::lookup_mut(&mut root, old_parent)
            .ok_or_else(|| FsError::not_found("rename", old_path.clone()))?;
        let Node::Dir { children: old_children, .. } = old_parent_node else {
            return Err(FsError::not_found("rename", old_path));
        };
        let node = old_children
            .remove(*old_leaf)
            .ok_or_else(|| FsError::not_found("rename", old_path.clone()))?;

        let (new_leaf, new_parent) = new_components
            .split_last()
            .ok_or_else(|| FsError::unsupported("rename: cannot rename onto root"))?;
        Self::ensure_dirs(&mut root, new_parent, 0o755)?;
        let new_parent_node = Self::lookup_mut(&mut root, new_parent)
            .ok_or_else(|| FsError::not_found("rename", new_path))?;
        let Node::Dir { children: new_children, .. } = new_parent_node else {
            return Err(FsError::unsupported("rename: destination parent is not a directory"));
        };
        new_children.insert(new_leaf.to_string(), node);
        Ok(())
    }

    async fn walk(&self, root_name: &str, f: &mut dyn WalkFn) -> FsResult<()> {
        let mut stack = vec![root_name.to_string()];
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
        Ok(Box::new(MemoryFs {
            root: Arc::clone(&self.root),
            prefix: self.full_path(dir),
        }))
    }

    fn as_metadata(&self) -> Option<&dyn MetadataCapability> {
        Some(self)
    }
}

#[async_trait]
impl MetadataCapability for MemoryFs {
    async fn lstat(&self, name: &str) -> FsResult<FileInfo> {
        self.stat(name).await
    }

    async fn chmod(&self, name: &str, mode: u32) -> FsResult<()> {
        let path = self.full_path(name);
        let components = Self::components(&path);
        let mut root = self.root.lock();
        let node = Self::lookup_mut(&mut root, &components).ok_or_else(|| FsError::not_found("chmod", path))?;
        match node {
            Node::File { mode: m, .. } | Node::Dir { mode: m, .. } => *m = mode,
        }
        Ok(())
    }

    async fn chtimes(&self, name: &str, _atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let path = self.full_path(name);
        let components = Self::components(&path);
        let mut root = self.root.lock();
        let node = Self::lookup_mut(&mut root, &components).ok_or_else(|| FsError::not_found("chtimes", path))?;
        match node {
            Node::File { mod_time, .. } | Node::Dir { mod_time, .. } => *mod_time = mtime,
        }
        Ok(())
    }
}

struct MemoryFile {
    root: Arc<Mutex<Node>>,
    path: Vec<String>,
    cursor: usize,
    /// Read-mode: the whole file's data, read from. Write-mode: staged bytes
    /// flushed to the tree on `sync`/`close`.
    buffer: Vec<u8>,
    append: bool,
    closed: bool,
}

impl MemoryFile {
    fn flush_to_tree(&mut self) -> FsResult<()> {
        let components: Vec<&str> = self.path.iter().map(String::as_str).collect();
        let mut root = self.root.lock();
        let (leaf, parent) = components
            .split_last()
            .ok_or_else(|| FsError::unsupported("write: cannot write to root"))?;
        let parent_node = MemoryFs::lookup_mut(&mut root, parent)
            .ok_or_else(|| FsError::not_found("write", self.path.join("/")))?;
        let Node::Dir { children, .. } = parent_node else {
            return Err(FsError::unsupported("write: parent is not a directory"));
        };
        children.insert(
            leaf.to_string(),
            Node::File {
                data: self.buffer.clone(),
                mode: children
                    .get(*leaf)
                    .map(Node::mode)
                    .unwrap_or(0o644),
                mod_time: SystemTime::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl File for MemoryFile {
    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        if self.closed {
            return Err(FsError::Closed);
        }
        let remaining = &self.buffer[self.cursor.min(self.buffer.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> FsResult<()> {
        if self.closed {
            return Err(FsError::Closed);
        }
        if self.append {
            self.buffer.extend_from_slice(buf);
        } else {
            let end = self.cursor + buf.len();
            if self.buffer.len() < end {
                self.buffer.resize(end, 0);
            }
            self.buffer[self.cursor..end].copy_from_slice(buf);
            self.cursor = end;
        }
        self.flush_to_tree()
    }

    async fn sync(&mut self) -> FsResult<()> {
        if self.closed {
            return Err(FsError::Closed);
        }
        self.flush_to_tree()
    }

    async fn close(&mut self) -> FsResult<()> {
        self.closed = true;
        Ok(())
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        if self.closed {
            return Err(FsError::Closed);
        }
        Ok(FileInfo {
            name: self.path.last().cloned().unwrap_or_default(),
            is_dir: false,
            size: self.buffer.len() as u64,
            mod_time: Some(SystemTime::now()),
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
impl Seekable for MemoryFile {
    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let new_cursor = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => self.buffer.len() as i64 + n,
            SeekFrom::Current(n) => self.cursor as i64 + n,
        };
        if new_cursor < 0 {
            return Err(FsError::unsupported("seek: negative position"));
        }
        self.cursor = new_cursor as usize;
        Ok(self.cursor as u64)
    }
}

#[async_trait]
impl ReadAt for MemoryFile {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let offset = offset as usize;
        if offset >= self.buffer.len() {
            return Ok(0);
        }
        let remaining = &self.buffer[offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = MemoryFs::new();
        fs.write_file("a/b.txt", b"hello", 0o644).await.unwrap();
        assert_eq!(fs.read_file("a/b.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn remove_missing_is_not_found() {
        let fs = MemoryFs::new();
        let err = fs.remove("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn chroot_shares_underlying_tree() {
        let fs = MemoryFs::new();
        fs.mkdir_all("sub", 0o755).await.unwrap();
        let sub = fs.chroot("sub").unwrap();
        sub.write_file("x.txt", b"data", 0o644).await.unwrap();
        assert_eq!(fs.read_file("sub/x.txt").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn read_dir_sorted_and_rename_moves() {
        let fs = MemoryFs::new();
        fs.write_file("b.txt", b"1", 0o644).await.unwrap();
        fs.write_file("a.txt", b"2", 0o644).await.unwrap();
        let names: Vec<_> = fs.read_dir(".").await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        fs.rename("a.txt", "moved/a.txt").await.unwrap();
        assert_eq!(fs.exists("a.txt").await.unwrap(), false);
        assert_eq!(fs.read_file("moved/a.txt").await.unwrap(), b"2");
    }
}
