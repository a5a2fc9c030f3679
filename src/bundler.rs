//! Assembling a directory on an [`Fs`] into a single tar+gzip blob (spec §4.4).

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::extract::validators::sanitize_mode;
use crate::fs::{Fs, FsResult, WalkAction};

/// Compression level used for bundle blobs. `Compression::default()` (6)
/// balances ratio against CPU cost, matching the ratio the registry's own
/// layer gzip streams are typically tuned for.
pub fn compression_level() -> Compression {
    Compression::default()
}

/// Packs everything under `root` on `source` into a tar+gzip byte buffer.
///
/// Permission bits are sanitized the same way the extractor does on the way
/// back out (setuid/setgid/sticky masked), so a bundle never carries bits
/// that would be meaningless or dangerous once extracted elsewhere.
/// Symlinks are included only if `source` exposes [`Fs::as_symlinks`]; other
/// backends (the object-store backend, which has no symlink concept) bundle
/// without them.
pub async fn bundle_directory(
    source: &dyn Fs,
    root: &str,
    cancel: &CancellationToken,
) -> FsResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), compression_level());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    let mut entries = Vec::new();
    source
        .walk(root, &mut |path, info| {
            entries.push((path.to_string(), info.clone()));
            Ok(WalkAction::Continue)
        })
        .await?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let symlinks = source.as_symlinks();

    for (path, info) in &entries {
        if cancel.is_cancelled() {
            return Err(crate::fs::FsError::unsupported("bundle_directory: cancelled"));
        }

        if info.is_dir {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(sanitize_mode(info.mode | 0o755));
            header.set_size(0);
            header.set_cksum();
            append_async(&mut builder, header, path.clone(), Vec::new()).await?;
            continue;
        }

        if let Some(caps) = symlinks {
            if let Ok(target) = caps.read_link(path).await {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(sanitize_mode(info.mode | 0o777));
                header.set_size(0);
                builder
                    .append_link(&mut header, path, &target)
                    .map_err(std::io::Error::from)?;
                continue;
            }
        }

        let data = source.read_file(path).await?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(sanitize_mode(info.mode | 0o644));
        header.set_size(data.len() as u64);
        header.set_cksum();
        append_async(&mut builder, header, path.clone(), data).await?;
    }

    let encoder = builder
        .into_inner()
        .map_err(std::io::Error::from)?;
    let bytes = encoder.finish().map_err(std::io::Error::from)?;
    debug!("bundler: packed {} entries into {} bytes", entries.len(), bytes.len());
    Ok(bytes)
}

/// `tar::Builder::append_data` takes a synchronous `Read`; since every byte
/// is already in memory by the time we call it (read via the async `Fs`
/// above), wrapping it in a `Cursor` keeps this a plain synchronous call
/// with no actual blocking I/O.
async fn append_async<W: Write>(
    builder: &mut tar::Builder<W>,
    header: tar::Header,
    path: String,
    data: Vec<u8>,
) -> FsResult<()> {
    let mut header = header;
    builder
        .append_data(&mut header, path, std::io::Cursor::new(data))
        .map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFs;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn bundles_files_and_directories() {
        let fs = MemoryFs::new();
        fs.write_file("a.txt", b"hello", 0o644).await.unwrap();
        fs.write_file("dir/b.txt", b"world", 0o644).await.unwrap();

        let blob = bundle_directory(&fs, ".", &CancellationToken::new()).await.unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(std::io::Cursor::new(blob)));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            names.push(entry.path().unwrap().to_string_lossy().into_owned());
        }
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"dir/b.txt".to_string()));
    }

    #[tokio::test]
    async fn sanitizes_setuid_bit() {
        let fs = MemoryFs::new();
        fs.write_file("x.sh", b"#!/bin/sh", 0o4755).await.unwrap();
        let blob = bundle_directory(&fs, ".", &CancellationToken::new()).await.unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(std::io::Cursor::new(blob)));
        let mut entries = archive.entries().unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.header().mode().unwrap() & 0o7000, 0);
    }
}
