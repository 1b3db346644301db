//! File-based configuration.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. An explicit path
//! 2. `~/.config/reqstate/config.toml` (the platform config dir)
//! 3. Built-in defaults
//!
//! ```toml
//! [http]
//! base_url = "https://api.example.com"
//! timeout_secs = 30
//!
//! [cache]
//! expire_ms = 60000        # or "infinity"
//! mode = "storage_restore" # memory | storage_placeholder | storage_restore
//! tag = "v2"
//! max_entries = 10000
//!
//! [storage]
//! enabled = true
//! dir = "/var/cache/myapp"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::FileStorage;
use crate::cache::response::DEFAULT_MAX_ENTRIES;
use crate::types::{CacheMode, LocalCache, Ttl};
use crate::{ReqstateError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqstateConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Transport settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Prefix for relative method URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Context-wide cache defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL for every method of the context. Unset keeps the
    /// per-verb defaults.
    #[serde(default)]
    pub expire_ms: Option<Ttl>,
    #[serde(default)]
    pub mode: CacheMode,
    #[serde(default)]
    pub tag: Option<String>,
    /// Memory cache capacity (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expire_ms: None,
            mode: CacheMode::default(),
            tag: None,
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist responses to files (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Storage directory (default: `~/.cache/reqstate/storage`).
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(FileStorage::default_dir)
    }
}

impl ReqstateConfig {
    /// Load configuration from the standard locations.
    ///
    /// Without an explicit path and without a user config file, the
    /// defaults are returned.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReqstateError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ReqstateError::Configuration(msg) => {
                ReqstateError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            ReqstateError::Configuration(format!("failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(ReqstateError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        Ok(dirs::config_dir()
            .map(|dir| dir.join("reqstate").join("config.toml"))
            .filter(|path| path.exists()))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(ReqstateError::Configuration(
                "cache.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.cache.expire_ms.is_none() && (self.cache.mode.persists() || self.cache.tag.is_some())
        {
            return Err(ReqstateError::Configuration(
                "cache.mode and cache.tag require cache.expire_ms".to_string(),
            ));
        }
        if self.cache.mode.persists() && !self.storage.enabled {
            return Err(ReqstateError::Configuration(
                "storage cache modes require storage.enabled = true".to_string(),
            ));
        }
        if let Some(base_url) = &self.http.base_url
            && base_url.trim().is_empty()
        {
            return Err(ReqstateError::Configuration(
                "http.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Context default cache setting, when `[cache]` sets an expiry.
    pub fn local_cache(&self) -> Option<LocalCache> {
        let expire = self.cache.expire_ms?;
        let cache = LocalCache::new(expire).mode(self.cache.mode);
        Some(match &self.cache.tag {
            Some(tag) => cache.tag(tag),
            None => cache,
        })
    }
}
