//! Glob-based selection of which archive entries to materialize (spec §4.5).
//!
//! Directories are always traversed regardless of whether they themselves
//! match a pattern — selection only decides whether an entry is *recorded*
//! for extraction, never whether its descendants are reachable.

/// A set of include/exclude glob patterns (`*`, `**`, `?`) deciding which
/// entries an [`super::Extractor`] extracts.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Selector {
    /// A selector that matches everything.
    pub fn all() -> Self {
        Selector::default()
    }

    /// Adds an include pattern. If any include patterns are present, an
    /// entry must match at least one to be selected.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Adds an exclude pattern. An entry matching any exclude pattern is
    /// never selected, regardless of include patterns.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Whether `path` (a directory entry is always traversed independent of
    /// this) should be extracted.
    pub fn matches(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| glob_match::glob_match(p, path)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| glob_match::glob_match(p, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selector_matches_everything() {
        let s = Selector::all();
        assert!(s.matches("a/b.txt"));
    }

    #[test]
    fn include_restricts_to_matching_patterns() {
        let s = Selector::all().include("*.txt").include("docs/**");
        assert!(s.matches("readme.txt"));
        assert!(s.matches("docs/a/b.md"));
        assert!(!s.matches("src/main.rs"));
    }

    #[test]
    fn exclude_overrides_include() {
        let s = Selector::all().include("**").exclude("*.secret");
        assert!(s.matches("a.txt"));
        assert!(!s.matches("a.secret"));
    }
}
