//! Typed configuration surfaces, validated at construction time rather than
//! deep inside whatever operation first needs the bad value.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
#[cfg(feature = "object-store")]
use crate::fs::object_store::{rename::DEFAULT_WORKERS, ObjectStoreOptions};

/// Configuration for the S3-compatible object-store backend.
#[cfg(feature = "object-store")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// The bucket name.
    pub bucket: String,
    /// A key prefix every path is rooted under.
    #[serde(default)]
    pub prefix: String,
    /// The region to configure the underlying `aws-sdk-s3` client with.
    #[serde(default = "default_region")]
    pub region: String,
    /// A custom endpoint URL, for S3-compatible (non-AWS) object stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Whether to use path-style bucket addressing (`endpoint/bucket/key`)
    /// instead of virtual-hosted style (`bucket.endpoint/key`). Most
    /// non-AWS S3-compatible stores need this set.
    #[serde(default)]
    pub force_path_style: bool,
    /// Bytes buffered before a write switches to a multipart upload.
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,
    /// Max concurrent copy+delete pairs during a directory rename.
    #[serde(default = "default_rename_workers")]
    pub rename_workers: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_buffer_threshold() -> usize {
    5 * 1024 * 1024
}

fn default_rename_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig {
            bucket: String::new(),
            prefix: String::new(),
            region: default_region(),
            endpoint: None,
            force_path_style: false,
            buffer_threshold: default_buffer_threshold(),
            rename_workers: default_rename_workers(),
        }
    }
}

#[cfg(feature = "object-store")]
impl ObjectStoreConfig {
    /// Checks that this configuration is usable, before it's handed to
    /// anything that would otherwise fail much later and less clearly.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::Config("object store bucket must not be empty".to_string()));
        }
        if self.region.is_empty() {
            return Err(Error::Config("object store region must not be empty".to_string()));
        }
        if self.buffer_threshold == 0 {
            return Err(Error::Config("object store buffer_threshold must be positive".to_string()));
        }
        if self.rename_workers == 0 {
            return Err(Error::Config("object store rename_workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Converts the tuning knobs of this config into [`ObjectStoreOptions`].
    pub fn to_backend_options(&self) -> ObjectStoreOptions {
        ObjectStoreOptions {
            buffer_threshold: self.buffer_threshold,
            rename_workers: self.rename_workers,
        }
    }
}

/// Configuration for directory-wide renames on backends where rename is
/// non-atomic (object-store today; any future backend with the same
/// limitation can reuse this type).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenameConfig {
    /// Max concurrent copy+delete pairs.
    #[serde(default = "default_rename_workers")]
    pub workers: usize,
}

impl Default for RenameConfig {
    fn default() -> Self {
        RenameConfig {
            workers: default_rename_workers(),
        }
    }
}

impl RenameConfig {
    /// Checks that `workers` is at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("rename workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration for [`crate::client::Client`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Allow plaintext HTTP to the target registry (local/test registries only).
    #[serde(default)]
    pub registry_insecure: bool,
    /// Bytes buffered in memory before a push spools through a temp file.
    #[serde(default = "default_push_spool_threshold")]
    pub push_spool_threshold: usize,
}

fn default_push_spool_threshold() -> usize {
    crate::oci::push::DEFAULT_SPOOL_THRESHOLD
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            registry_insecure: false,
            push_spool_threshold: default_push_spool_threshold(),
        }
    }
}

impl ClientConfig {
    /// Checks that this configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.push_spool_threshold == 0 {
            return Err(Error::Config("push_spool_threshold must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "object-store")]
    fn object_store_config_rejects_empty_bucket() {
        let config = ObjectStoreConfig {
            bucket: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[cfg(feature = "object-store")]
    fn object_store_config_defaults_are_valid() {
        let config = ObjectStoreConfig {
            bucket: "my-bucket".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rename_config_rejects_zero_workers() {
        assert!(RenameConfig { workers: 0 }.validate().is_err());
    }
}
