//! Selecting cached methods and describing manual cache writes

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::types::MethodDescriptor;

type MethodFilter = Arc<dyn Fn(&MethodDescriptor) -> bool + Send + Sync>;

/// Which methods a manual cache operation applies to.
///
/// A filter only sees methods that currently have a fresh memory cache
/// entry in this context.
#[derive(Clone)]
pub enum MethodMatcher {
    Method(MethodDescriptor),
    Filter(MethodFilter),
}

impl MethodMatcher {
    pub fn filter<F>(f: F) -> Self
    where
        F: Fn(&MethodDescriptor) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Filter(Arc::new(f))
    }

    /// Cached methods whose URL contains `fragment`.
    pub fn url_contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        Self::filter(move |method| method.url.contains(&fragment))
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::Method(method) => f.debug_tuple("Method").field(method).finish(),
            MethodMatcher::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

impl From<MethodDescriptor> for MethodMatcher {
    fn from(method: MethodDescriptor) -> Self {
        MethodMatcher::Method(method)
    }
}

impl From<&MethodDescriptor> for MethodMatcher {
    fn from(method: &MethodDescriptor) -> Self {
        MethodMatcher::Method(method.clone())
    }
}

/// Derives new cache data from the current entry (`None` when absent or
/// stale). Returning `None` leaves the entry alone.
pub type CacheUpdater = Arc<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

/// New data for a manual cache write.
#[derive(Clone)]
pub enum CacheUpdate {
    Replace(Value),
    Update(CacheUpdater),
}

impl CacheUpdate {
    pub fn with<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        CacheUpdate::Update(Arc::new(f))
    }
}

impl fmt::Debug for CacheUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheUpdate::Replace(data) => f.debug_tuple("Replace").field(data).finish(),
            CacheUpdate::Update(_) => f.write_str("Update(..)"),
        }
    }
}

impl From<Value> for CacheUpdate {
    fn from(data: Value) -> Self {
        CacheUpdate::Replace(data)
    }
}
