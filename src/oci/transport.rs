//! Process-global cache of configured [`oci_client::Client`]s.
//!
//! Building a client isn't expensive by itself, but it owns a connection
//! pool, and we want every push/pull against the same registry in a process
//! to reuse one pool rather than open fresh TCP/TLS connections per call.
//! The cache key is a structural summary of the client configuration with no
//! secrets in it — credentials are resolved and attached per-call by
//! [`super::auth`], not baked into the cached client.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::Client;
use parking_lot::Mutex;

/// Non-secret knobs that affect how a client talks to a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey {
    /// The registry host this client is configured for.
    pub registry: String,
    /// Whether to allow plaintext HTTP to this registry (for local/test
    /// registries that don't terminate TLS).
    pub insecure: bool,
}

fn cache() -> &'static Mutex<HashMap<TransportKey, Arc<Client>>> {
    static CACHE: OnceLock<Mutex<HashMap<TransportKey, Arc<Client>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns a cached [`Client`] for `key`, building and caching one if needed.
pub fn client_for(key: TransportKey) -> Arc<Client> {
    if let Some(client) = cache().lock().get(&key) {
        return Arc::clone(client);
    }
    log::debug!("oci: building new registry client for {} (insecure={})", key.registry, key.insecure);
    let protocol = if key.insecure {
        ClientProtocol::HttpsExcept(vec![key.registry.clone()])
    } else {
        ClientProtocol::Https
    };
    let client = Arc::new(Client::new(ClientConfig {
        protocol,
        ..Default::default()
    }));
    cache().lock().insert(key, Arc::clone(&client));
    client
}

/// Drops every cached client, releasing their connection pools.
pub fn clear_cache() {
    cache().lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_client() {
        clear_cache();
        let key = TransportKey {
            registry: "registry.test.example".to_string(),
            insecure: false,
        };
        let a = client_for(key.clone());
        let b = client_for(key);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_return_different_clients() {
        clear_cache();
        let a = client_for(TransportKey {
            registry: "a.test.example".to_string(),
            insecure: false,
        });
        let b = client_for(TransportKey {
            registry: "b.test.example".to_string(),
            insecure: false,
        });
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
