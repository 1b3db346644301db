//! Durable key/value storage backends.
//!
//! [`Storage`] is the minimal string-to-string contract the persistent
//! response layer needs. Two backends ship with the crate:
//!
//! - [`MemoryStorage`]: a mutex-guarded map, for tests and short-lived
//!   processes.
//! - [`FileStorage`]: one file per key under a directory, default
//!   `~/.cache/reqstate/storage`. File names are the SHA-256 of the key
//!   since method keys contain characters no filesystem accepts.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::Result;
use crate::sync::lock;

/// Durable string storage.
///
/// Errors are reported but never fatal: the persistent layer treats an
/// unavailable storage as a cache miss.
pub trait Storage: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process storage backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// Storage with one JSON file per key.
///
/// The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default directory: `~/.cache/reqstate/storage`.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("reqstate")
            .join("storage")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let name: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl Storage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        // unique temp file per write, then an atomic rename
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
