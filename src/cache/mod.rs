//! Caching subsystem.
//!
//! Two layers, both keyed by `(context, method key)`:
//!
//! - [`ResponseCacheStore`]: in-memory, moka-backed, per-entry TTL. Read on
//!   every request attempt. One store may be shared by several contexts.
//!
//! - [`PersistentStore`]: optional durable layer over a [`Storage`]
//!   backend. Written when a method's cache mode is a storage mode, read
//!   when binding initial state and, in restore mode, to seed the memory
//!   layer.

pub mod persistent;
pub mod response;
pub mod storage;

pub use persistent::{ExpireAt, PersistedEntry, PersistentStore};
pub use response::ResponseCacheStore;
pub use storage::{FileStorage, MemoryStorage, Storage};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifier isolating one configured orchestrator's cache entries.
///
/// Explicit ids are stable across restarts, which persisted entries need.
/// Generated ids are unique within the process only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// A fresh process-unique id.
    pub fn generate() -> Self {
        let n = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        Self::new(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}
