//! Safe tar+gzip extraction: a validator chain run against every entry
//! before anything is written, plus optional glob-based selective extraction
//! (spec §4.5).

pub mod error;
pub mod selective;
pub mod validators;

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

pub use error::{ExtractError, ExtractResult};
pub use selective::Selector;
pub use validators::HiddenFilePolicy;

use validators::{sanitize_mode, CountValidator, EntryMeta, PathSafetyValidator, SizeValidator, SymlinkContainmentValidator, Validator};

use crate::fs::Fs;

/// Default per-file size cap: 4 GiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4 * 1024 * 1024 * 1024;
/// Default cumulative archive size cap: 16 GiB.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 16 * 1024 * 1024 * 1024;
/// Default entry-count cap.
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000_000;

/// Whether entries are validated one at a time as they're extracted
/// ([`ExtractionMode::Streaming`]) or the whole archive is validated before
/// anything is written ([`ExtractionMode::ValidateFirst`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Validate and write each entry in one pass. A rejection partway
    /// through leaves everything extracted up to that point on disk.
    #[default]
    Streaming,
    /// Validate every entry first; only if the whole archive passes does a
    /// second pass actually write anything.
    ValidateFirst,
}

/// Configuration for an [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Per-file size cap.
    pub max_file_bytes: u64,
    /// Cumulative archive size cap.
    pub max_total_bytes: u64,
    /// Entry-count cap.
    pub max_entries: u64,
    /// Whether dotfile entries are allowed.
    pub hidden_files: HiddenFilePolicy,
    /// Single-pass vs validate-then-extract.
    pub mode: ExtractionMode,
    /// Which entries to materialize; directories are always traversed.
    pub selector: Selector,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            hidden_files: HiddenFilePolicy::Allow,
            mode: ExtractionMode::Streaming,
            selector: Selector::all(),
        }
    }
}

/// What an extraction accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Regular files written.
    pub files_written: u64,
    /// Directories created.
    pub dirs_created: u64,
    /// Symlinks created.
    pub symlinks_created: u64,
    /// Total bytes written across all files.
    pub bytes_written: u64,
    /// Entries skipped because they didn't match the selector.
    pub entries_skipped: u64,
}

/// Validates and extracts tar+gzip archives under a configured policy.
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    /// Builds an extractor with the given options.
    pub fn new(options: ExtractOptions) -> Self {
        Extractor { options }
    }

    /// Extracts `archive_bytes` (a gzip-compressed tar stream) under
    /// `dest_root` on `dest`, checking `cancel` between entries.
    pub async fn extract(
        &self,
        archive_bytes: &[u8],
        dest: &dyn Fs,
        dest_root: &str,
        cancel: &CancellationToken,
    ) -> ExtractResult<ExtractReport> {
        if self.options.mode == ExtractionMode::ValidateFirst {
            debug!("extract: validate-first pass over {} bytes", archive_bytes.len());
            self.validate_all(archive_bytes)?;
        }
        self.extract_pass(archive_bytes, dest, dest_root, cancel).await
    }

    fn build_validators(&self) -> Vec<Box<dyn Validator>> {
        vec![
            Box::new(PathSafetyValidator::new(self.options.hidden_files)),
            Box::new(SizeValidator::new(self.options.max_file_bytes, self.options.max_total_bytes)),
            Box::new(CountValidator::new(self.options.max_entries)),
            Box::new(SymlinkContainmentValidator),
        ]
    }

    fn validate_all(&self, archive_bytes: &[u8]) -> ExtractResult<()> {
        let mut validators = self.build_validators();
        let mut archive = open_archive(archive_bytes);
        for entry in archive.entries().map_err(|e| ExtractError::Malformed(e.to_string()))? {
            let entry = entry.map_err(|e| ExtractError::Malformed(e.to_string()))?;
            let meta = entry_meta(&entry)?;
            for v in validators.iter_mut() {
                v.validate(&meta)?;
            }
        }
        Ok(())
    }

    async fn extract_pass(
        &self,
        archive_bytes: &[u8],
        dest: &dyn Fs,
        dest_root: &str,
        cancel: &CancellationToken,
    ) -> ExtractResult<ExtractReport> {
        let mut validators = self.build_validators();
        let mut archive = open_archive(archive_bytes);
        let mut report = ExtractReport::default();

        for entry_result in archive.entries().map_err(|e| ExtractError::Malformed(e.to_string()))? {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let mut entry = entry_result.map_err(|e| ExtractError::Malformed(e.to_string()))?;
            let meta = entry_meta(&entry)?;

            if !meta.is_dir && !self.options.selector.matches(&meta.path) {
                report.entries_skipped += 1;
                continue;
            }

            for v in validators.iter_mut() {
                v.validate(&meta)?;
            }

            let full_path = crate::fs::join_path(dest_root, &meta.path);

            if meta.is_dir {
                dest.mkdir_all(&full_path, sanitize_mode(meta.mode)).await?;
                report.dirs_created += 1;
                continue;
            }

            if meta.is_symlink {
                let target = meta.link_target.clone().unwrap_or_default();
                match dest.as_symlinks() {
                    Some(symlinks) => {
                        symlinks.symlink(&target, &full_path).await?;
                        report.symlinks_created += 1;
                    }
                    None => {
                        warn!(
                            "extract: skipping symlink {full_path:?} -> {target:?}, destination backend doesn't support symlinks"
                        );
                    }
                }
                continue;
            }

            if let Some((parent, _)) = full_path.rsplit_once('/') {
                dest.mkdir_all(parent, 0o755).await?;
            }
            let mut data = Vec::with_capacity(meta.size as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| ExtractError::Malformed(format!("{}: {e}", meta.path)))?;
            dest.write_file(&full_path, &data, sanitize_mode(meta.mode)).await?;
            report.files_written += 1;
            report.bytes_written += data.len() as u64;
        }

        debug!(
            "extract: wrote {} file(s), {} dir(s), {} symlink(s), {} byte(s) under {dest_root:?}",
            report.files_written, report.dirs_created, report.symlinks_created, report.bytes_written
        );
        Ok(report)
    }
}

fn open_archive(bytes: &[u8]) -> tar::Archive<GzDecoder<Cursor<&[u8]>>> {
    tar::Archive::new(GzDecoder::new(Cursor::new(bytes)))
}

fn entry_meta<R: Read>(entry: &tar::Entry<'_, R>) -> ExtractResult<EntryMeta> {
    let header = entry.header();
    let path = entry
        .path()
        .map_err(|e| ExtractError::Malformed(e.to_string()))?
        .to_string_lossy()
        .into_owned();
    let is_symlink = matches!(
        header.entry_type(),
        tar::EntryType::Symlink | tar::EntryType::Link
    );
    let link_target = entry
        .link_name()
        .map_err(|e| ExtractError::Malformed(e.to_string()))?
        .map(|p| p.to_string_lossy().into_owned());

    Ok(EntryMeta {
        path,
        size: header.size().unwrap_or(0),
        is_dir: header.entry_type().is_dir(),
        is_symlink,
        link_target,
        mode: header.mode().unwrap_or(0o644),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFs;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn extracts_plain_archive() {
        let archive = build_archive(&[("a.txt", b"hello"), ("dir/b.txt", b"world")]);
        let dest = MemoryFs::new();
        let extractor = Extractor::new(ExtractOptions::default());
        let report = extractor
            .extract(&archive, &dest, ".", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_written, 2);
        assert_eq!(dest.read_file("a.txt").await.unwrap(), b"hello");
        assert_eq!(dest.read_file("dir/b.txt").await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let archive = build_archive(&[("../escape.txt", b"bad")]);
        let dest = MemoryFs::new();
        let extractor = Extractor::new(ExtractOptions::default());
        let err = extractor
            .extract(&archive, &dest, ".", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert!(err.to_string().contains("traversal"), "error message must mention traversal: {err}");
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let archive = build_archive(&[("big.bin", &[0u8; 1024])]);
        let dest = MemoryFs::new();
        let mut options = ExtractOptions::default();
        options.max_file_bytes = 100;
        let extractor = Extractor::new(options);
        let err = extractor
            .extract(&archive, &dest, ".", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn selective_extraction_skips_unmatched_entries() {
        let archive = build_archive(&[("keep.txt", b"1"), ("skip.bin", b"2")]);
        let dest = MemoryFs::new();
        let mut options = ExtractOptions::default();
        options.selector = Selector::all().include("*.txt");
        let extractor = Extractor::new(options);
        let report = extractor
            .extract(&archive, &dest, ".", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_written, 1);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(dest.exists("skip.bin").await.unwrap(), false);
    }

    #[tokio::test]
    async fn validate_first_rejects_before_writing_anything() {
        let archive = build_archive(&[("good.txt", b"ok"), ("../bad.txt", b"bad")]);
        let dest = MemoryFs::new();
        let mut options = ExtractOptions::default();
        options.mode = ExtractionMode::ValidateFirst;
        let extractor = Extractor::new(options);
        let err = extractor
            .extract(&archive, &dest, ".", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversal { .. }));
        assert_eq!(dest.exists("good.txt").await.unwrap(), false);
    }

    #[tokio::test]
    async fn cancellation_stops_extraction() {
        let archive = build_archive(&[("a.txt", b"1"), ("b.txt", b"2")]);
        let dest = MemoryFs::new();
        let extractor = Extractor::new(ExtractOptions::default());
        let token = CancellationToken::new();
        token.cancel();
        let err = extractor.extract(&archive, &dest, ".", &token).await.unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }
}
