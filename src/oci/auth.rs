//! Credential resolution and a process-global, TTL-bounded credential cache.
//!
//! Resolution precedence (spec §4.3): a caller-supplied custom resolver,
//! then static credentials configured up front, then the registry's default
//! (anonymous) auth. Resolved credentials are cached per-registry for 5
//! minutes so repeated pushes/pulls to the same registry in one process
//! don't re-run a custom resolver (which might itself call out to a secrets
//! manager) on every call.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use oci_client::secrets::RegistryAuth;
use parking_lot::Mutex;

use super::error::{OciError, OciResult};

/// How long a resolved credential is trusted before being re-resolved.
const CREDENTIAL_TTL: Duration = Duration::from_secs(5 * 60);

/// A caller-supplied credential resolver, e.g. to call out to a secrets
/// manager. Takes the registry host, returns the auth to present to it.
pub trait CredentialResolver: Send + Sync {
    /// Resolves credentials for `registry`.
    fn resolve(&self, registry: &str) -> OciResult<RegistryAuth>;
}

impl<F> CredentialResolver for F
where
    F: Fn(&str) -> OciResult<RegistryAuth> + Send + Sync,
{
    fn resolve(&self, registry: &str) -> OciResult<RegistryAuth> {
        self(registry)
    }
}

/// How a caller wants credentials resolved for registry operations.
#[derive(Clone)]
pub enum AuthConfig {
    /// Call the given resolver for every registry host, subject to caching.
    Custom(Arc<dyn CredentialResolver>),
    /// Always present this fixed set of credentials, but only to `registry`.
    Static {
        /// The registry host these credentials are scoped to, e.g.
        /// `registry.example.com`. Presented only when the host being
        /// authenticated against matches exactly.
        registry: String,
        /// Registry username.
        username: String,
        /// Registry password or token.
        password: String,
    },
    /// Present no credentials; rely on the registry's anonymous access.
    Anonymous,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::Custom(_) => f.write_str("AuthConfig::Custom(..)"),
            AuthConfig::Static { registry, username, .. } => f
                .debug_struct("AuthConfig::Static")
                .field("registry", registry)
                .field("username", username)
                .finish_non_exhaustive(),
            AuthConfig::Anonymous => f.write_str("AuthConfig::Anonymous"),
        }
    }
}

struct CachedCredential {
    auth: RegistryAuth,
    resolved_at: Instant,
}

fn cache() -> &'static Mutex<HashMap<String, CachedCredential>> {
    static CACHE: OnceLock<Mutex<HashMap<String, CachedCredential>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolves credentials for `registry` according to `config`, consulting and
/// populating the process-global cache.
pub fn resolve(config: &AuthConfig, registry: &str) -> OciResult<RegistryAuth> {
    if let Some(cached) = cache().lock().get(registry) {
        if cached.resolved_at.elapsed() < CREDENTIAL_TTL {
            log::debug!("oci: credential cache hit for {registry}");
            return Ok(clone_auth(&cached.auth));
        }
    }
    log::debug!("oci: credential cache miss for {registry}, resolving");

    let auth = match config {
        AuthConfig::Custom(resolver) => resolver.resolve(registry)?,
        AuthConfig::Static { registry: configured, username, password } => {
            if configured == registry {
                RegistryAuth::Basic(username.clone(), password.clone())
            } else {
                log::debug!(
                    "oci: static credentials are scoped to {configured}, not presenting them to {registry}"
                );
                RegistryAuth::Anonymous
            }
        }
        AuthConfig::Anonymous => RegistryAuth::Anonymous,
    };

    cache().lock().insert(
        registry.to_string(),
        CachedCredential {
            auth: clone_auth(&auth),
            resolved_at: Instant::now(),
        },
    );
    Ok(auth)
}

/// Drops every cached credential, e.g. after a known credential rotation.
pub fn clear_cache() {
    cache().lock().clear();
}

fn clone_auth(auth: &RegistryAuth) -> RegistryAuth {
    match auth {
        RegistryAuth::Anonymous => RegistryAuth::Anonymous,
        RegistryAuth::Basic(u, p) => RegistryAuth::Basic(u.clone(), p.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_auth_round_trips_through_cache() {
        clear_cache();
        let config = AuthConfig::Static {
            registry: "registry.test.example".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let first = resolve(&config, "registry.test.example").unwrap();
        let second = resolve(&config, "registry.test.example").unwrap();
        assert!(matches!(first, RegistryAuth::Basic(ref u, ref p) if u == "u" && p == "p"));
        assert!(matches!(second, RegistryAuth::Basic(..)));
    }

    #[test]
    fn static_auth_is_not_presented_to_other_registries() {
        clear_cache();
        let config = AuthConfig::Static {
            registry: "registry.test.example".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let auth = resolve(&config, "other.test.example").unwrap();
        assert!(matches!(auth, RegistryAuth::Anonymous));
    }

    #[test]
    fn custom_resolver_is_invoked() {
        clear_cache();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let config = AuthConfig::Custom(Arc::new(move |_: &str| {
            calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(RegistryAuth::Anonymous)
        }));
        resolve(&config, "a.test.example").unwrap();
        resolve(&config, "a.test.example").unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1, "second call should hit cache");
    }
}
