//! Path-to-object-key normalization for the S3-compatible backend.
//!
//! Object stores have no real directories, so every path this backend
//! receives is normalized the same way [`crate::fs::normalize_path`] does for
//! the other backends and then joined onto a fixed bucket prefix. The result
//! never contains `.`/`..` components and never starts with `/`.

use crate::fs::normalize_path;

/// Joins `prefix` (already normalized, no leading/trailing slash) with a
/// caller path, producing the full S3 object key.
pub fn object_key(prefix: &str, path: &str) -> String {
    let normalized = normalize_path(path);
    match (prefix.is_empty(), normalized.as_str()) {
        (true, ".") => String::new(),
        (true, _) => normalized,
        (false, ".") => prefix.to_string(),
        (false, _) => format!("{prefix}/{normalized}"),
    }
}

/// Returns the key's "directory" prefix suitable for a delimited
/// `ListObjectsV2` call: empty, or ending in exactly one `/`.
pub fn key_as_dir_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Strips `prefix` (and a following `/`, if present) from `key`, returning
/// the path relative to the backend's root.
pub fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    let stripped = key.strip_prefix(prefix).unwrap_or(key);
    stripped.strip_prefix('/').unwrap_or(stripped)
}

/// The last path component of a key, i.e. what `ReadDir` reports as an
/// entry's name.
pub fn basename(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_joins_prefix() {
        assert_eq!(object_key("root", "a/b"), "root/a/b");
        assert_eq!(object_key("", "a/b"), "a/b");
        assert_eq!(object_key("root", "."), "root");
        assert_eq!(object_key("", "."), "");
    }

    #[test]
    fn object_key_rejects_traversal() {
        assert_eq!(object_key("root", "../../etc/passwd"), "root/etc/passwd");
    }

    #[test]
    fn strip_prefix_handles_separator() {
        assert_eq!(strip_prefix("root/a/b", "root"), "a/b");
        assert_eq!(strip_prefix("a/b", ""), "a/b");
    }

    #[test]
    fn basename_trims_trailing_slash() {
        assert_eq!(basename("a/b/c/"), "c");
        assert_eq!(basename("a/b/c"), "c");
        assert_eq!(basename("c"), "c");
    }
}
