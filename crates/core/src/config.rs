//! Configuration types shared across crates.

use crate::shard::ShardSpec;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "STASH_";

/// Storage backend configuration.
///
/// This is the backend's connection info: persisting it and connecting again
/// yields an operationally identical backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Directory sharding applied to blob ids.
        #[serde(default = "default_shards")]
        shards: ShardSpec,
    },
    /// WebDAV server.
    Webdav {
        /// Base collection URL (e.g., "https://dav.example.com/backups/").
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Directory sharding applied to blob ids.
        #[serde(default = "default_shards")]
        shards: ShardSpec,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_shards() -> ShardSpec {
    ShardSpec::new(vec![3, 3]).unwrap_or_default()
}

fn default_timeout_secs() -> u64 {
    60
}

impl StorageConfig {
    /// Short backend identifier ("filesystem", "webdav").
    pub fn backend_type(&self) -> &'static str {
        match self {
            Self::Filesystem { .. } => "filesystem",
            Self::Webdav { .. } => "webdav",
        }
    }

    pub fn shards(&self) -> &ShardSpec {
        match self {
            Self::Filesystem { shards, .. } | Self::Webdav { shards, .. } => shards,
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem config requires a non-empty path".to_string());
                }
                Ok(())
            }
            Self::Webdav {
                url,
                username,
                password,
                timeout_secs,
                ..
            } => {
                let lower = url.to_ascii_lowercase();
                if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                    return Err(format!("webdav url must be http(s): {url}"));
                }
                if username.is_some() != password.is_some() {
                    return Err(
                        "webdav config requires both username and password when either is set"
                            .to_string(),
                    );
                }
                if *timeout_secs == 0 {
                    return Err("webdav timeout_secs must be greater than zero".to_string());
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem { path, shards } => f
                .debug_struct("Filesystem")
                .field("path", path)
                .field("shards", shards)
                .finish(),
            Self::Webdav {
                url,
                username,
                password,
                shards,
                timeout_secs,
            } => f
                .debug_struct("Webdav")
                .field("url", url)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .field("shards", shards)
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

/// Repository-level configuration persisted alongside repository metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub storage: StorageConfig,
}

impl RepositoryConfig {
    /// Load from a TOML file merged with `STASH_` environment overrides.
    ///
    /// Nested keys use `__`, e.g. `STASH_STORAGE__URL`.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Parse from a TOML string (no environment overrides).
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        Self::extract(Figment::new().merge(Toml::string(s)))
    }

    fn extract(figment: Figment) -> crate::Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.storage.validate().map_err(crate::Error::Config)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let body = self.to_toml_string()?;
        std::fs::write(path, body)
            .map_err(|e| crate::Error::Config(format!("failed to write {}: {e}", path.display())))
    }
}
