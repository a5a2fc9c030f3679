//! Parsing for `host[:port]/path/repository(:tag|@digest)` references.

use super::error::OciError;

/// What part of the repository a [`Reference`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A mutable tag, e.g. `latest` or `v1.2.3`.
    Tag(String),
    /// An immutable content digest, e.g. `sha256:...`.
    Digest(String),
}

/// A fully-qualified reference to a bundle in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The registry host, with an optional `:port`.
    pub registry: String,
    /// The repository path within the registry (may itself contain `/`).
    pub repository: String,
    /// The tag or digest selecting a specific manifest.
    pub selector: Selector,
}

impl Reference {
    /// Parses `s`. Unlike Docker-style references, the registry host is
    /// always required explicitly — there is no default registry for
    /// bundles, since there is no established convention to default to.
    pub fn parse(s: &str) -> Result<Self, OciError> {
        if s.is_empty() {
            return Err(OciError::Reference(s.to_string()));
        }

        let (rest, selector) = if let Some(at) = s.find('@') {
            let digest = &s[at + 1..];
            validate_digest(digest).map_err(|_| OciError::Reference(s.to_string()))?;
            (&s[..at], Selector::Digest(digest.to_string()))
        } else if let Some(colon) = s.rfind(':') {
            let slash = s.rfind('/').unwrap_or(usize::MAX);
            if slash == usize::MAX || colon > slash {
                (&s[..colon], Selector::Tag(s[colon + 1..].to_string()))
            } else {
                (s, Selector::Tag("latest".to_string()))
            }
        } else {
            (s, Selector::Tag("latest".to_string()))
        };

        let Some(slash) = rest.find('/') else {
            return Err(OciError::Reference(s.to_string()));
        };
        let registry = &rest[..slash];
        let repository = &rest[slash + 1..];
        if registry.is_empty() || repository.is_empty() {
            return Err(OciError::Reference(s.to_string()));
        }
        if let Selector::Tag(tag) = &selector {
            if tag.is_empty() {
                return Err(OciError::Reference(s.to_string()));
            }
        }

        Ok(Reference {
            registry: registry.to_string(),
            repository: repository.to_string(),
            selector,
        })
    }

    /// Renders back to `registry/repository:tag` or `registry/repository@digest`.
    pub fn to_string_lossy(&self) -> String {
        match &self.selector {
            Selector::Tag(tag) => format!("{}/{}:{tag}", self.registry, self.repository),
            Selector::Digest(digest) => format!("{}/{}@{digest}", self.registry, self.repository),
        }
    }
}

fn validate_digest(digest: &str) -> Result<(), ()> {
    let Some((algo, hex)) = digest.split_once(':') else {
        return Err(());
    };
    match algo {
        "sha256" if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(()),
        "sha512" if hex.len() == 128 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(()),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag() {
        let r = Reference::parse("registry.example.com/ns/repo:v1").unwrap();
        assert_eq!(r.registry, "registry.example.com");
        assert_eq!(r.repository, "ns/repo");
        assert_eq!(r.selector, Selector::Tag("v1".to_string()));
    }

    #[test]
    fn parses_port_and_default_tag() {
        let r = Reference::parse("localhost:5000/ns/repo").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "ns/repo");
        assert_eq!(r.selector, Selector::Tag("latest".to_string()));
    }

    #[test]
    fn parses_digest() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let r = Reference::parse(&format!("reg.io/a/b@{digest}")).unwrap();
        assert_eq!(r.selector, Selector::Digest(digest));
    }

    #[test]
    fn rejects_missing_repository() {
        assert!(Reference::parse("registry.example.com").is_err());
    }

    #[test]
    fn rejects_malformed_digest() {
        assert!(Reference::parse("reg.io/a/b@sha256:nothex").is_err());
    }
}
