//! Persisted responses.
//!
//! [`PersistentStore`] serialises a [`PersistedEntry`] per
//! `(context, method key)` into a [`Storage`] backend under the key
//! `reqstate.{context}.{method key}`. The record layout is
//!
//! ```json
//! { "data": <response>, "expireAt": 1712345678901 | "Infinity", "tag": "v1",
//!   "method": { "verb": "GET", "url": "/todos", "params": { "page": 1 } } }
//! ```
//!
//! with `expireAt` in wall-clock milliseconds since the Unix epoch, so
//! entries survive process restarts. `method` identifies the request that
//! produced the record; it is optional and ignored when reading.
//!
//! Reading never fails: a missing, unreadable, expired or tag-mismatched
//! record is reported as absent. Unreadable and expired records are
//! removed on the way.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use super::ContextId;
use super::storage::Storage;
use crate::Result;
use crate::key::MethodKey;
use crate::telemetry;
use crate::types::{MethodDescriptor, SerializedMethod, Ttl};

/// Absolute expiry of a persisted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireAt {
    /// Milliseconds since the Unix epoch.
    At(u64),
    Never,
}

impl ExpireAt {
    /// Expiry of an entry written at `now_ms` with the given TTL.
    pub fn from_ttl(ttl: Ttl, now_ms: u64) -> Self {
        match ttl.duration() {
            Some(d) => ExpireAt::At(now_ms.saturating_add(d.as_millis() as u64)),
            None => ExpireAt::Never,
        }
    }

    /// `now >= expireAt`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self {
            ExpireAt::At(at) => now_ms >= *at,
            ExpireAt::Never => false,
        }
    }
}

impl Serialize for ExpireAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ExpireAt::At(ms) => serializer.serialize_u64(*ms),
            ExpireAt::Never => serializer.serialize_str("Infinity"),
        }
    }
}

impl<'de> Deserialize<'de> for ExpireAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            At(u64),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::At(ms) => Ok(ExpireAt::At(ms)),
            Raw::Named(s) if s == "Infinity" => Ok(ExpireAt::Never),
            Raw::Named(s) => Err(D::Error::custom(format!("invalid expireAt '{s}'"))),
        }
    }
}

/// One persisted response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub data: Value,
    #[serde(rename = "expireAt")]
    pub expire_at: ExpireAt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<SerializedMethod>,
}

/// Durable response layer over a [`Storage`] backend.
#[derive(Clone)]
pub struct PersistentStore {
    storage: Arc<dyn Storage>,
}

impl PersistentStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Storage key for a `(context, method key)` pair.
    pub fn storage_key(context: &ContextId, key: &MethodKey) -> String {
        format!("reqstate.{context}.{key}")
    }

    /// Persist data with an expiry derived from `ttl`.
    ///
    /// A disabled TTL persists nothing.
    pub fn persist(
        &self,
        context: &ContextId,
        key: &MethodKey,
        data: &Value,
        ttl: Ttl,
        tag: Option<&str>,
    ) -> Result<()> {
        self.write(context, key, data, ttl, tag, None)
    }

    /// [`persist`](Self::persist) keyed by `method`, recording the method
    /// alongside the data.
    pub fn persist_method(
        &self,
        context: &ContextId,
        method: &MethodDescriptor,
        data: &Value,
        ttl: Ttl,
        tag: Option<&str>,
    ) -> Result<()> {
        let key = method.key();
        self.write(context, &key, data, ttl, tag, Some(SerializedMethod::from(method)))
    }

    fn write(
        &self,
        context: &ContextId,
        key: &MethodKey,
        data: &Value,
        ttl: Ttl,
        tag: Option<&str>,
        method: Option<SerializedMethod>,
    ) -> Result<()> {
        if !ttl.is_enabled() {
            return Ok(());
        }
        let entry = PersistedEntry {
            data: data.clone(),
            expire_at: ExpireAt::from_ttl(ttl, now_millis()),
            tag: tag.map(str::to_owned),
            method,
        };
        let serialized = serde_json::to_string(&entry)?;
        self.storage
            .set_item(&Self::storage_key(context, key), &serialized)
    }

    /// Read back persisted data.
    ///
    /// Absent when there is no record, it cannot be parsed, it has
    /// expired, or its tag differs from `tag`.
    pub fn restore(&self, context: &ContextId, key: &MethodKey, tag: Option<&str>) -> Option<Value> {
        let storage_key = Self::storage_key(context, key);
        let raw = match self.storage.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                record_miss();
                return None;
            }
            Err(e) => {
                warn!(
                    storage = self.storage.name(),
                    key = %key,
                    error = %e,
                    "persistent storage unavailable, treating as miss"
                );
                record_miss();
                return None;
            }
        };

        let entry: PersistedEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable persisted response");
                self.remove_raw(&storage_key);
                record_miss();
                return None;
            }
        };

        if entry.expire_at.is_expired(now_millis()) {
            debug!(key = %key, "persisted response expired");
            self.remove_raw(&storage_key);
            record_miss();
            return None;
        }

        if entry.tag.as_deref() != tag {
            debug!(
                key = %key,
                stored = ?entry.tag,
                expected = ?tag,
                "persisted response tag mismatch"
            );
            record_miss();
            return None;
        }

        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "layer" => "storage").increment(1);
        Some(entry.data)
    }

    /// Remove a persisted entry. Idempotent.
    pub fn remove(&self, context: &ContextId, key: &MethodKey) {
        self.remove_raw(&Self::storage_key(context, key));
    }

    fn remove_raw(&self, storage_key: &str) {
        if let Err(e) = self.storage.remove_item(storage_key) {
            warn!(storage = self.storage.name(), error = %e, "failed to remove persisted response");
        }
    }
}

fn record_miss() {
    metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "layer" => "storage").increment(1);
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
