//! In-memory response cache.
//!
//! [`ResponseCacheStore`] maps `(context, method key)` to the processed
//! response data and its expiry. Entries carry their own TTL: moka's
//! per-entry expiry reclaims memory, and every read re-checks
//! `now < expire_at` so a stale entry is never served even before moka's
//! housekeeping has run. Freshness is measured on the Tokio clock, which
//! follows paused and advanced time inside a test runtime.
//!
//! Entries written through [`set_for_method`](ResponseCacheStore::set_for_method)
//! remember the method that produced them, which is what
//! [`snapshot_matching`](ResponseCacheStore::snapshot_matching) filters on.
//!
//! The store is shareable between contexts (`Arc<ResponseCacheStore>`);
//! the context id in the key keeps their entries apart.

use std::sync::Arc;
use std::time::Duration;

use moka::Expiry;
use moka::sync::Cache;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::ContextId;
use crate::key::{MethodKey, compute_key};
use crate::telemetry;
use crate::types::{MethodDescriptor, Ttl};

/// Default maximum number of entries across all contexts.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

type EntryKey = (ContextId, MethodKey);

#[derive(Clone)]
struct CacheEntry {
    data: Value,
    /// `None` never expires.
    expire_at: Option<Instant>,
    ttl: Option<Duration>,
    method: Option<Arc<MethodDescriptor>>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expire_at.is_none_or(|at| now < at)
    }
}

struct EntryExpiry;

impl Expiry<EntryKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &EntryKey,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &EntryKey,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Process-wide, context-scoped response cache.
pub struct ResponseCacheStore {
    entries: Cache<EntryKey, CacheEntry>,
}

impl ResponseCacheStore {
    /// Create an empty store with the default capacity (10,000).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create an empty store with a custom capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Look up fresh data for a key.
    ///
    /// An expired entry reads as absent and is removed. Emits cache
    /// hit/miss metrics.
    pub fn get(&self, context: &ContextId, key: &MethodKey) -> Option<Value> {
        let entry_key = (context.clone(), key.clone());
        match self.entries.get(&entry_key) {
            Some(entry) if entry.is_fresh(Instant::now()) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "layer" => "memory").increment(1);
                Some(entry.data)
            }
            Some(_) => {
                debug!(context = %context, key = %key, "evicting expired cache entry");
                self.entries.invalidate(&entry_key);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "layer" => "memory")
                    .increment(1);
                None
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "layer" => "memory")
                    .increment(1);
                None
            }
        }
    }

    /// Fresh data for a key without recording metrics or evicting.
    pub fn peek(&self, context: &ContextId, key: &MethodKey) -> Option<Value> {
        self.entries
            .get(&(context.clone(), key.clone()))
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.data)
    }

    /// Whether a fresh entry exists. No metrics, no eviction.
    pub fn contains(&self, context: &ContextId, key: &MethodKey) -> bool {
        self.peek(context, key).is_some()
    }

    /// Store data under a key.
    ///
    /// A disabled TTL (zero) stores nothing. If the key already carries a
    /// method from an earlier write, it is kept.
    pub fn set(&self, context: &ContextId, key: &MethodKey, data: Value, ttl: Ttl) {
        let entry_key = (context.clone(), key.clone());
        let method = self
            .entries
            .get(&entry_key)
            .and_then(|existing| existing.method);
        self.insert(entry_key, data, ttl, method);
    }

    /// Store data for a method, remembering the method for snapshots.
    pub fn set_for_method(
        &self,
        context: &ContextId,
        method: &MethodDescriptor,
        data: Value,
        ttl: Ttl,
    ) {
        let entry_key = (context.clone(), compute_key(method));
        self.insert(entry_key, data, ttl, Some(Arc::new(method.clone())));
    }

    fn insert(
        &self,
        entry_key: EntryKey,
        data: Value,
        ttl: Ttl,
        method: Option<Arc<MethodDescriptor>>,
    ) {
        if !ttl.is_enabled() {
            return;
        }
        let ttl = ttl.duration();
        let expire_at = ttl.and_then(|d| Instant::now().checked_add(d));
        debug!(
            context = %entry_key.0,
            key = %entry_key.1,
            ttl_ms = ttl.map(|d| d.as_millis() as u64),
            "caching response"
        );
        self.entries.insert(
            entry_key,
            CacheEntry {
                data,
                expire_at,
                ttl: expire_at.and(ttl),
                method,
            },
        );
    }

    /// Delete an entry. Removing an absent key is a no-op.
    pub fn remove(&self, context: &ContextId, key: &MethodKey) {
        self.entries.invalidate(&(context.clone(), key.clone()));
    }

    /// Methods of all fresh entries in `context` accepted by `predicate`.
    ///
    /// Entries written without a method (plain [`set`](Self::set)) are
    /// never returned.
    pub fn snapshot_matching<F>(&self, context: &ContextId, predicate: F) -> Vec<MethodDescriptor>
    where
        F: Fn(&MethodDescriptor) -> bool,
    {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(key, entry)| key.0 == *context && entry.is_fresh(now))
            .filter_map(|(_, entry)| entry.method)
            .filter(|method| predicate(method))
            .map(|method| (*method).clone())
            .collect()
    }

    /// Drop every entry belonging to `context`.
    pub fn clear_context(&self, context: &ContextId) {
        let keys: Vec<Arc<EntryKey>> = self
            .entries
            .iter()
            .filter(|(key, _)| key.0 == *context)
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.entries.invalidate(key.as_ref());
        }
    }
}

impl Default for ResponseCacheStore {
    fn default() -> Self {
        Self::new()
    }
}
