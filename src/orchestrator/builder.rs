//! Builder for configuring orchestrator instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::RequestOrchestrator;
use super::engine::{BeforeRequest, Inner, Responded, Settings};
use crate::cache::{ContextId, FileStorage, PersistentStore, ResponseCacheStore, Storage};
use crate::config::ReqstateConfig;
use crate::hooks::StatesHook;
use crate::transport::RequestAdapter;
use crate::types::{LocalCache, MethodDescriptor, Response};
use crate::{ReqstateError, Result};

/// Main entry point for creating orchestrator instances.
pub struct Reqstate;

impl Reqstate {
    /// Create a new builder around a states hook.
    pub fn builder<H: StatesHook>(hook: H) -> ReqstateBuilder<H> {
        ReqstateBuilder::new(hook)
    }
}

/// Builder for configuring orchestrator instances.
pub struct ReqstateBuilder<H: StatesHook> {
    hook: H,
    adapter: Option<Arc<dyn RequestAdapter>>,
    #[cfg(feature = "http")]
    http: bool,
    id: Option<ContextId>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    storage: Option<Arc<dyn Storage>>,
    local_cache: Option<LocalCache>,
    cache_store: Option<Arc<ResponseCacheStore>>,
    max_cache_entries: Option<u64>,
    before_request: Option<BeforeRequest>,
    responded: Option<Responded>,
}

impl<H: StatesHook> ReqstateBuilder<H> {
    pub fn new(hook: H) -> Self {
        Self {
            hook,
            adapter: None,
            #[cfg(feature = "http")]
            http: false,
            id: None,
            base_url: None,
            timeout: None,
            storage: None,
            local_cache: None,
            cache_store: None,
            max_cache_entries: None,
            before_request: None,
            responded: None,
        }
    }

    /// Use a custom transport adapter.
    pub fn adapter(mut self, adapter: Arc<dyn RequestAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Use the built-in reqwest transport.
    #[cfg(feature = "http")]
    pub fn http(mut self) -> Self {
        self.http = true;
        self
    }

    /// Context id. Set it explicitly when persisted responses must survive
    /// a restart; generated ids change every run.
    pub fn id(mut self, id: impl Into<ContextId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Prefix for relative method URLs.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Default timeout for all requests. Methods may override it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Durable backend for storage cache modes.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// File-backed durable storage under `dir`.
    pub fn file_storage(self, dir: impl Into<PathBuf>) -> Self {
        self.storage(Arc::new(FileStorage::new(dir)))
    }

    /// Cache setting for methods without their own.
    pub fn local_cache(mut self, cache: impl Into<LocalCache>) -> Self {
        self.local_cache = Some(cache.into());
        self
    }

    /// Share a memory cache with other contexts.
    pub fn cache_store(mut self, store: Arc<ResponseCacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Capacity of the memory cache this builder creates. Ignored when a
    /// shared store is supplied.
    pub fn max_cache_entries(mut self, max: u64) -> Self {
        self.max_cache_entries = Some(max);
        self
    }

    /// Hook run on every descriptor right before it reaches the adapter.
    ///
    /// The cache key is computed before the hook runs.
    pub fn before_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MethodDescriptor) + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(f));
        self
    }

    /// Convert raw responses into data. An error fails the request.
    pub fn responded<F>(mut self, f: F) -> Self
    where
        F: Fn(Response) -> Result<Value> + Send + Sync + 'static,
    {
        self.responded = Some(Arc::new(f));
        self
    }

    /// Apply a loaded configuration. Settings made on the builder
    /// afterwards take precedence.
    pub fn config(mut self, config: &ReqstateConfig) -> Self {
        if let Some(url) = &config.http.base_url {
            self.base_url = Some(url.clone());
        }
        if let Some(timeout) = config.http.timeout() {
            self.timeout = Some(timeout);
        }
        if let Some(cache) = config.local_cache() {
            self.local_cache = Some(cache);
        }
        self.max_cache_entries = Some(config.cache.max_entries);
        if config.storage.enabled {
            self.storage = Some(Arc::new(FileStorage::new(config.storage.resolved_dir())));
        }
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<RequestOrchestrator<H>> {
        let adapter = self.resolve_adapter()?;

        if self.max_cache_entries == Some(0) {
            return Err(ReqstateError::Configuration(
                "max_cache_entries must be greater than zero".to_string(),
            ));
        }
        let cache = self.cache_store.unwrap_or_else(|| {
            Arc::new(ResponseCacheStore::with_max_entries(
                self.max_cache_entries
                    .unwrap_or(crate::cache::response::DEFAULT_MAX_ENTRIES),
            ))
        });

        let id = self.id.unwrap_or_else(ContextId::generate);
        debug!(
            context = %id,
            adapter = adapter.name(),
            storage = self.storage.as_ref().map(|s| s.name()),
            "building request orchestrator"
        );

        let settings = Settings {
            id,
            cache,
            persistent: self.storage.map(PersistentStore::new),
            local_cache: self.local_cache,
            base_url: self.base_url,
            timeout: self.timeout,
            before_request: self.before_request,
            responded: self.responded,
        };
        Ok(RequestOrchestrator::from_inner(Inner::new(
            self.hook, adapter, settings,
        )))
    }

    fn resolve_adapter(&self) -> Result<Arc<dyn RequestAdapter>> {
        if let Some(adapter) = &self.adapter {
            return Ok(Arc::clone(adapter));
        }
        #[cfg(feature = "http")]
        if self.http {
            let adapter = crate::transport::HttpAdapter::new()?;
            return Ok(Arc::new(adapter));
        }
        Err(ReqstateError::NoAdapter)
    }
}
