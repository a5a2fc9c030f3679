//! End-to-end round trips across bundling, extraction, and both the local
//! and in-memory [`catalyst_bundle::fs::Fs`] backends.

use catalyst_bundle::bundler::bundle_directory;
use catalyst_bundle::extract::{ExtractOptions, Extractor};
use catalyst_bundle::fs::local::LocalFs;
use catalyst_bundle::fs::memory::MemoryFs;
use catalyst_bundle::fs::{Fs, OpenFlags};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn bundle_then_extract_round_trips_a_directory_tree() {
    let source = MemoryFs::new();
    source.write_file("README.txt", b"hello bundle", 0o644).await.unwrap();
    source.write_file("nested/dir/file.bin", b"\x00\x01\x02binary", 0o644).await.unwrap();
    source.mkdir_all("empty/dir", 0o755).await.unwrap();

    let blob = bundle_directory(&source, ".", &CancellationToken::new()).await.unwrap();

    let dest = MemoryFs::new();
    let extractor = Extractor::new(ExtractOptions::default());
    let report = extractor
        .extract(&blob, &dest, ".", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.files_written, 2);
    assert_eq!(dest.read_file("README.txt").await.unwrap(), b"hello bundle");
    assert_eq!(dest.read_file("nested/dir/file.bin").await.unwrap(), b"\x00\x01\x02binary");
}

#[tokio::test]
async fn local_fs_write_read_rename_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = LocalFs::new(tmp.path());

    fs.write_file("a.txt", b"v1", 0o644).await.unwrap();
    assert_eq!(fs.read_file("a.txt").await.unwrap(), b"v1");

    fs.rename("a.txt", "b.txt").await.unwrap();
    assert!(!fs.exists("a.txt").await.unwrap());
    assert_eq!(fs.read_file("b.txt").await.unwrap(), b"v1");

    fs.remove("b.txt").await.unwrap();
    assert!(!fs.exists("b.txt").await.unwrap());
}

#[tokio::test]
async fn local_fs_remove_missing_path_fails_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = LocalFs::new(tmp.path());
    let err = fs.remove("does-not-exist.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn memory_fs_chroot_isolates_the_subtree() {
    let root = MemoryFs::new();
    root.mkdir_all("project/data", 0o755).await.unwrap();
    root.write_file("project/data/file.txt", b"scoped", 0o644).await.unwrap();
    root.write_file("outside.txt", b"not visible", 0o644).await.unwrap();

    let scoped = root.chroot("project/data").unwrap();
    assert_eq!(scoped.read_file("file.txt").await.unwrap(), b"scoped");
    assert!(scoped.stat("../../outside.txt").await.is_err() || !scoped.exists("../../outside.txt").await.unwrap_or(false));
}

#[tokio::test]
async fn open_file_rejects_excl_on_existing_file() {
    let fs = MemoryFs::new();
    fs.write_file("x.txt", b"already here", 0o644).await.unwrap();
    let err = fs
        .open_file("x.txt", OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCL, 0o644)
        .await
        .unwrap_err();
    assert!(matches!(err, catalyst_bundle::fs::FsError::AlreadyExists { .. }));
}
