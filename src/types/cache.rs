//! Cache policy types: mode, time-to-live and per-method cache settings

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::method::{Headers, HttpVerb, MethodDescriptor};

/// Default freshness for safe (GET/HEAD) requests: 5 minutes.
pub const DEFAULT_SAFE_TTL: Duration = Duration::from_millis(300_000);

/// Where responses live and whether they come back after a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Memory only.
    #[default]
    Memory,
    /// Persist, but only use the persisted value as initial state.
    StoragePlaceholder,
    /// Persist, and seed the memory cache from storage when it is empty.
    StorageRestore,
}

impl CacheMode {
    /// Whether responses are written to durable storage.
    pub fn persists(self) -> bool {
        matches!(self, CacheMode::StoragePlaceholder | CacheMode::StorageRestore)
    }
}

/// How long a cached response stays fresh.
///
/// A zero duration disables caching. Deserialises from a number of
/// milliseconds or the string `"infinity"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTtl", into = "RawTtl")]
pub enum Ttl {
    After(Duration),
    Infinite,
}

impl Ttl {
    pub const DISABLED: Ttl = Ttl::After(Duration::ZERO);

    pub fn millis(ms: u64) -> Self {
        Ttl::After(Duration::from_millis(ms))
    }

    /// `false` for a zero duration.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Ttl::After(d) if d.is_zero())
    }

    /// Duration until expiry, `None` when the entry never expires.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Ttl::After(d) => Some(*d),
            Ttl::Infinite => None,
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::After(d)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTtl {
    Millis(u64),
    Named(String),
}

impl TryFrom<RawTtl> for Ttl {
    type Error = String;

    fn try_from(raw: RawTtl) -> Result<Self, Self::Error> {
        match raw {
            RawTtl::Millis(ms) => Ok(Ttl::millis(ms)),
            RawTtl::Named(s) if s.eq_ignore_ascii_case("infinity") => Ok(Ttl::Infinite),
            RawTtl::Named(s) => Err(format!(
                "invalid expire '{s}': expected milliseconds or \"infinity\""
            )),
        }
    }
}

impl From<Ttl> for RawTtl {
    fn from(ttl: Ttl) -> Self {
        match ttl {
            Ttl::After(d) => RawTtl::Millis(d.as_millis() as u64),
            Ttl::Infinite => RawTtl::Named("infinity".to_string()),
        }
    }
}

/// TTL computed from the processed response.
pub type StaleFn = Arc<dyn Fn(&Value, &Headers, HttpVerb) -> Ttl + Send + Sync>;

/// Fixed or response-dependent time-to-live.
#[derive(Clone)]
pub enum StaleTime {
    Fixed(Ttl),
    /// Evaluated once per successful response, e.g. to honour a
    /// server-supplied expiry header.
    Dynamic(StaleFn),
}

impl StaleTime {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Value, &Headers, HttpVerb) -> Ttl + Send + Sync + 'static,
    {
        StaleTime::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, data: &Value, headers: &Headers, verb: HttpVerb) -> Ttl {
        match self {
            StaleTime::Fixed(ttl) => *ttl,
            StaleTime::Dynamic(f) => f(data, headers, verb),
        }
    }
}

impl fmt::Debug for StaleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleTime::Fixed(ttl) => f.debug_tuple("Fixed").field(ttl).finish(),
            StaleTime::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<Ttl> for StaleTime {
    fn from(ttl: Ttl) -> Self {
        StaleTime::Fixed(ttl)
    }
}

/// Per-method (or per-context) cache settings.
///
/// A bare number converts to a memory-mode setting in milliseconds:
///
/// ```rust
/// # use reqstate::{CacheMode, LocalCache, Ttl};
/// let plain: LocalCache = 10_000u64.into();
/// assert_eq!(plain.mode, CacheMode::Memory);
///
/// let stored = LocalCache::new(Ttl::Infinite)
///     .mode(CacheMode::StorageRestore)
///     .tag("v2");
/// assert!(stored.persists());
/// ```
#[derive(Debug, Clone)]
pub struct LocalCache {
    pub expire: StaleTime,
    pub mode: CacheMode,
    /// Version tag for persisted entries; a mismatch reads as absent.
    pub tag: Option<String>,
}

impl LocalCache {
    pub fn new(expire: impl Into<StaleTime>) -> Self {
        Self {
            expire: expire.into(),
            mode: CacheMode::Memory,
            tag: None,
        }
    }

    /// Caching switched off.
    pub fn disabled() -> Self {
        Self::new(Ttl::DISABLED)
    }

    /// Verb default: 5 minutes for GET/HEAD, no caching otherwise.
    pub fn default_for(verb: HttpVerb) -> Self {
        if verb.is_safe() {
            Self::new(Ttl::After(DEFAULT_SAFE_TTL))
        } else {
            Self::disabled()
        }
    }

    /// Resolve the effective setting for a method: its own setting, then
    /// the context default, then the verb default.
    pub fn resolve(method: &MethodDescriptor, context_default: Option<&LocalCache>) -> Self {
        method
            .config
            .local_cache
            .clone()
            .or_else(|| context_default.cloned())
            .unwrap_or_else(|| Self::default_for(method.verb))
    }

    pub fn mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn tag(mut self, tag: impl ToString) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn persists(&self) -> bool {
        self.mode.persists()
    }
}

impl From<u64> for LocalCache {
    fn from(ms: u64) -> Self {
        Self::new(Ttl::millis(ms))
    }
}

impl From<Ttl> for LocalCache {
    fn from(ttl: Ttl) -> Self {
        Self::new(ttl)
    }
}

impl From<StaleTime> for LocalCache {
    fn from(expire: StaleTime) -> Self {
        Self::new(expire)
    }
}
