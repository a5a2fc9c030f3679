//! The validator chain run against every archive entry before it is written
//! (spec §4.5). Each validator is independent and stateless except where it
//! must track a running total (cumulative size, entry count).

use super::error::ExtractError;

/// Metadata about one archive entry, independent of the archive format.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    /// The entry's raw path as stored in the archive, before any normalization.
    pub path: String,
    /// Declared size in bytes (for a regular file; `0` for directories).
    pub size: u64,
    /// True if this entry is a directory.
    pub is_dir: bool,
    /// True if this entry is a symbolic link.
    pub is_symlink: bool,
    /// The symlink's target, if `is_symlink`.
    pub link_target: Option<String>,
    /// The entry's mode bits as stored in the archive.
    pub mode: u32,
}

/// A single validation step in the chain.
pub trait Validator: Send {
    /// A short identifier used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Checks `entry`, returning an error naming `self.name()` on rejection.
    fn validate(&mut self, entry: &EntryMeta) -> Result<(), ExtractError>;
}

/// Whether dotfile (hidden) entries are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HiddenFilePolicy {
    /// Hidden entries extract normally.
    #[default]
    Allow,
    /// Any path component starting with `.` (other than `.`/`..` themselves,
    /// which are rejected by [`PathSafetyValidator`] regardless) is rejected.
    Reject,
}

/// Rejects path traversal, absolute paths, control characters, and
/// (optionally) hidden files.
pub struct PathSafetyValidator {
    hidden: HiddenFilePolicy,
}

impl PathSafetyValidator {
    /// Builds a validator with the given hidden-file policy.
    pub fn new(hidden: HiddenFilePolicy) -> Self {
        PathSafetyValidator { hidden }
    }
}

impl Validator for PathSafetyValidator {
    fn name(&self) -> &'static str {
        "path-safety"
    }

    fn validate(&mut self, entry: &EntryMeta) -> Result<(), ExtractError> {
        let path = &entry.path;

        if path
            .bytes()
            .any(|b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f || b >= 0x80)
        {
            return Err(ExtractError::InvalidEntryName {
                entry: path.clone(),
                reason: "contains a control character, DEL, or a byte >= 0x80".to_string(),
            });
        }
        if path.starts_with('/') || path.starts_with('\\') || is_windows_drive_path(path) {
            return Err(ExtractError::AbsolutePath { entry: path.clone() });
        }
        if contains_percent_encoded_traversal(path) {
            return Err(ExtractError::InvalidEntryName {
                entry: path.clone(),
                reason: "contains a percent-encoded traversal sequence".to_string(),
            });
        }

        let normalized = crate::fs::normalize_path(path);
        for component in path.replace('\\', "/").split('/') {
            if component == ".." {
                return Err(ExtractError::PathTraversal { entry: path.clone() });
            }
        }
        if normalized != "." && normalized.split('/').any(|c| c == "..") {
            return Err(ExtractError::PathTraversal { entry: path.clone() });
        }

        if self.hidden == HiddenFilePolicy::Reject {
            let basename = path.rsplit('/').next().unwrap_or(path);
            if basename.starts_with('.') && basename != "." && basename != ".." {
                return Err(ExtractError::HiddenEntryRejected { entry: path.clone() });
            }
        }

        Ok(())
    }
}

fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn contains_percent_encoded_traversal(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.contains("%2e%2e") || lower.contains("..%2f") || lower.contains("%2e%2e%2f")
}

/// Rejects any entry whose size exceeds `max_file_bytes`, and rejects the
/// whole archive once the running total exceeds `max_total_bytes`.
pub struct SizeValidator {
    max_file_bytes: u64,
    max_total_bytes: u64,
    total_seen: u64,
}

impl SizeValidator {
    /// Builds a size validator with the given per-file and cumulative caps.
    pub fn new(max_file_bytes: u64, max_total_bytes: u64) -> Self {
        SizeValidator {
            max_file_bytes,
            max_total_bytes,
            total_seen: 0,
        }
    }
}

impl Validator for SizeValidator {
    fn name(&self) -> &'static str {
        "size"
    }

    fn validate(&mut self, entry: &EntryMeta) -> Result<(), ExtractError> {
        if entry.size > self.max_file_bytes {
            return Err(ExtractError::FileTooLarge {
                entry: entry.path.clone(),
                attempted: entry.size,
                allowed: self.max_file_bytes,
            });
        }
        self.total_seen += entry.size;
        if self.total_seen > self.max_total_bytes {
            return Err(ExtractError::ArchiveTooLarge {
                attempted: self.total_seen,
                allowed: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Rejects the archive once the entry count exceeds `max_entries`.
pub struct CountValidator {
    max_entries: u64,
    seen: u64,
}

impl CountValidator {
    /// Builds a count validator with the given cap.
    pub fn new(max_entries: u64) -> Self {
        CountValidator { max_entries, seen: 0 }
    }
}

impl Validator for CountValidator {
    fn name(&self) -> &'static str {
        "count"
    }

    fn validate(&mut self, _entry: &EntryMeta) -> Result<(), ExtractError> {
        self.seen += 1;
        if self.seen > self.max_entries {
            return Err(ExtractError::TooManyEntries {
                attempted: self.seen,
                allowed: self.max_entries,
            });
        }
        Ok(())
    }
}

/// Rejects a symlink whose target, resolved relative to its own directory,
/// would climb outside the extraction root.
pub struct SymlinkContainmentValidator;

impl Validator for SymlinkContainmentValidator {
    fn name(&self) -> &'static str {
        "symlink-containment"
    }

    fn validate(&mut self, entry: &EntryMeta) -> Result<(), ExtractError> {
        let Some(target) = &entry.link_target else {
            return Ok(());
        };
        if !entry.is_symlink {
            return Ok(());
        }
        if target.starts_with('/') || is_windows_drive_path(target) {
            return Err(ExtractError::SymlinkEscapesRoot {
                entry: entry.path.clone(),
                target: target.clone(),
            });
        }
        let entry_dir = entry.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let resolved = if entry_dir.is_empty() {
            target.clone()
        } else {
            format!("{entry_dir}/{target}")
        };
        let normalized = crate::fs::normalize_path(&resolved);
        if normalized == ".." || normalized.starts_with("../") {
            return Err(ExtractError::SymlinkEscapesRoot {
                entry: entry.path.clone(),
                target: target.clone(),
            });
        }
        // `normalize_path` silently drops leading `..` components once its
        // internal stack is empty (see `fs::normalize_path`), so a target
        // that climbs past the root normalizes to a plain relative path
        // rather than literally starting with "..". Re-derive the climb
        // depth directly instead of trusting the normalized form.
        let mut depth: i64 = 0;
        for component in resolved.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(ExtractError::SymlinkEscapesRoot {
                            entry: entry.path.clone(),
                            target: target.clone(),
                        });
                    }
                }
                _ => depth += 1,
            }
        }
        Ok(())
    }
}

/// Masks setuid, setgid, and sticky bits from `mode`, per spec §4.5's
/// permission-sanitization requirement. Applied at write time, not part of
/// the rejecting validator chain.
pub fn sanitize_mode(mode: u32) -> u32 {
    mode & !0o7000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> EntryMeta {
        EntryMeta {
            path: path.to_string(),
            size: 0,
            is_dir: false,
            is_symlink: false,
            link_target: None,
            mode: 0o644,
        }
    }

    #[test]
    fn rejects_dotdot_traversal() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("../../etc/passwd")).is_err());
        assert!(v.validate(&entry("a/../../b")).is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("/etc/passwd")).is_err());
        assert!(v.validate(&entry("C:\\Windows\\system32")).is_err());
    }

    #[test]
    fn rejects_percent_encoded_traversal() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("a/..%2f..%2fetc/passwd")).is_err());
    }

    #[test]
    fn allows_normal_paths() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("a/b/c.txt")).is_ok());
    }

    #[test]
    fn allows_tab_newline_and_carriage_return() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("a/b\tc")).is_ok());
        assert!(v.validate(&entry("a/b\nc")).is_ok());
        assert!(v.validate(&entry("a/b\rc")).is_ok());
    }

    #[test]
    fn rejects_other_control_characters_and_del() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("a/b\0c")).is_err());
        assert!(v.validate(&entry("a/b\x01c")).is_err());
        assert!(v.validate(&entry("a/b\x7fc")).is_err());
    }

    #[test]
    fn rejects_high_bit_bytes() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Allow);
        assert!(v.validate(&entry("a/café.txt")).is_err());
    }

    #[test]
    fn hidden_policy_rejects_dotfiles() {
        let mut v = PathSafetyValidator::new(HiddenFilePolicy::Reject);
        assert!(v.validate(&entry("a/.secret")).is_err());
        assert!(v.validate(&entry("a/visible.txt")).is_ok());
    }

    #[test]
    fn size_validator_enforces_per_file_and_total_caps() {
        let mut v = SizeValidator::new(100, 150);
        assert!(v.validate(&entry_sized("a", 50)).is_ok());
        assert!(v.validate(&entry_sized("b", 200)).is_err());
    }

    #[test]
    fn size_validator_enforces_cumulative_cap() {
        let mut v = SizeValidator::new(1000, 150);
        assert!(v.validate(&entry_sized("a", 100)).is_ok());
        assert!(v.validate(&entry_sized("b", 100)).is_err());
    }

    #[test]
    fn count_validator_enforces_cap() {
        let mut v = CountValidator::new(2);
        assert!(v.validate(&entry("a")).is_ok());
        assert!(v.validate(&entry("b")).is_ok());
        assert!(v.validate(&entry("c")).is_err());
    }

    #[test]
    fn symlink_containment_rejects_escaping_target() {
        let mut v = SymlinkContainmentValidator;
        let mut e = entry("a/link");
        e.is_symlink = true;
        e.link_target = Some("../../outside".to_string());
        assert!(v.validate(&e).is_err());
    }

    #[test]
    fn symlink_containment_allows_internal_target() {
        let mut v = SymlinkContainmentValidator;
        let mut e = entry("a/b/link");
        e.is_symlink = true;
        e.link_target = Some("../c".to_string());
        assert!(v.validate(&e).is_ok());
    }

    #[test]
    fn sanitize_mode_masks_setuid_setgid_sticky() {
        assert_eq!(sanitize_mode(0o4755), 0o755);
        assert_eq!(sanitize_mode(0o2755), 0o755);
        assert_eq!(sanitize_mode(0o1755), 0o755);
        assert_eq!(sanitize_mode(0o644), 0o644);
    }

    fn entry_sized(path: &str, size: u64) -> EntryMeta {
        let mut e = entry(path);
        e.size = size;
        e
    }
}
