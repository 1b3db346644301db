//! Request execution shared by every handle of one orchestrator.
//!
//! Lock discipline: `states` and `in_flight` are never held together, and
//! neither is held while calling into the [`StatesHook`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::{self, AbortHandle, AbortRegistration, Abortable, BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, warn};

use super::matcher::{CacheUpdate, MethodMatcher};
use crate::cache::{ContextId, PersistentStore, ResponseCacheStore};
use crate::hooks::StatesHook;
use crate::key::MethodKey;
use crate::rewrite::{Directive, apply_directives};
use crate::sync::lock;
use crate::telemetry;
use crate::transport::{ProgressSink, RequestAdapter};
use crate::types::{
    CacheMode, Headers, LocalCache, MethodDescriptor, RequestState, Response, StatePatch, Ttl,
};
use crate::{ReqstateError, Result};

/// Mutates a descriptor right before it reaches the adapter.
pub type BeforeRequest = Arc<dyn Fn(&mut MethodDescriptor) + Send + Sync>;

/// Converts a raw transport response into response data.
pub type Responded = Arc<dyn Fn(Response) -> Result<Value> + Send + Sync>;

pub(crate) type Outcome = Result<Value>;
pub(crate) type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// A state that receives outcomes, with the directives hydrating it.
#[derive(Clone)]
pub(crate) struct Target<S> {
    pub(crate) key: MethodKey,
    pub(crate) state: S,
    pub(crate) directives: Arc<Vec<Directive>>,
}

struct Binding<S> {
    state: S,
    directives: Arc<Vec<Directive>>,
    observers: usize,
}

impl<S: Clone> Binding<S> {
    fn target(&self, key: &MethodKey) -> Target<S> {
        Target {
            key: key.clone(),
            state: self.state.clone(),
            directives: Arc::clone(&self.directives),
        }
    }
}

struct InFlight {
    id: u64,
    outcome: SharedOutcome,
    abort: AbortHandle,
}

/// Everything the builder resolves before the orchestrator exists.
pub(crate) struct Settings {
    pub(crate) id: ContextId,
    pub(crate) cache: Arc<ResponseCacheStore>,
    pub(crate) persistent: Option<PersistentStore>,
    pub(crate) local_cache: Option<LocalCache>,
    pub(crate) base_url: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) before_request: Option<BeforeRequest>,
    pub(crate) responded: Option<Responded>,
}

pub(crate) struct Inner<H: StatesHook> {
    pub(crate) hook: H,
    pub(crate) adapter: Arc<dyn RequestAdapter>,
    pub(crate) settings: Settings,
    states: Mutex<HashMap<MethodKey, Binding<H::State>>>,
    in_flight: Mutex<HashMap<MethodKey, InFlight>>,
    next_request: AtomicU64,
}

impl<H: StatesHook> Inner<H> {
    pub(crate) fn new(hook: H, adapter: Arc<dyn RequestAdapter>, settings: Settings) -> Self {
        Self {
            hook,
            adapter,
            settings,
            states: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
        }
    }

    pub(crate) fn id(&self) -> &ContextId {
        &self.settings.id
    }

    pub(crate) fn cache(&self) -> &ResponseCacheStore {
        &self.settings.cache
    }

    pub(crate) fn local_cache_for(&self, method: &MethodDescriptor) -> LocalCache {
        LocalCache::resolve(method, self.settings.local_cache.as_ref())
    }

    // ===== Bound states =====

    /// Attach an observer to the state of `key`, creating it on first use.
    ///
    /// Later observers of the same key share the first one's state; their
    /// `initial` and `directives` are discarded.
    pub(crate) fn bind(
        &self,
        key: &MethodKey,
        initial: RequestState,
        directives: Vec<Directive>,
    ) -> Target<H::State> {
        if let Some(binding) = lock(&self.states).get_mut(key) {
            binding.observers += 1;
            return binding.target(key);
        }
        let state = self.hook.create(initial);
        let mut states = lock(&self.states);
        let binding = states
            .entry(key.clone())
            .and_modify(|binding| binding.observers += 1)
            .or_insert_with(|| Binding {
                state,
                directives: Arc::new(directives),
                observers: 1,
            });
        binding.target(key)
    }

    /// Detach one observer. The state goes away with the last one.
    pub(crate) fn release(&self, key: &MethodKey) {
        if let Entry::Occupied(mut entry) = lock(&self.states).entry(key.clone()) {
            let binding = entry.get_mut();
            binding.observers = binding.observers.saturating_sub(1);
            if binding.observers == 0 {
                debug!(context = %self.id(), key = %key, "releasing request state");
                entry.remove();
            }
        }
    }

    pub(crate) fn bound(&self, key: &MethodKey) -> Option<Target<H::State>> {
        lock(&self.states).get(key).map(|binding| binding.target(key))
    }

    pub(crate) fn observer_count(&self, key: &MethodKey) -> usize {
        lock(&self.states)
            .get(key)
            .map_or(0, |binding| binding.observers)
    }

    fn update_bound(&self, key: &MethodKey, patch: StatePatch) {
        if let Some(target) = self.bound(key) {
            self.hook.update(patch, &target.state);
        }
    }

    /// Write a finished outcome into a state.
    pub(crate) fn deliver(&self, target: &Target<H::State>, outcome: &Outcome) {
        let patch = match outcome {
            Ok(data) => StatePatch::new()
                .loading(false)
                .data(self.hydrate(target, data))
                .clear_error(),
            Err(error) => StatePatch::new().loading(false).error(error.clone()),
        };
        self.hook.update(patch, &target.state);
    }

    /// Response data as the target should see it: applied through its
    /// directives when it has any, verbatim otherwise.
    fn hydrate(&self, target: &Target<H::State>, data: &Value) -> Value {
        if target.directives.is_empty() {
            return data.clone();
        }
        let mut current = self.hook.dehydrate(&target.state).data;
        apply_directives(&mut current, &target.directives, data);
        current
    }

    // ===== Storage =====

    /// Persisted data for a method, if any.
    ///
    /// In restore mode the value is also copied into the memory cache,
    /// unless a fresh entry is already there.
    pub(crate) fn restore_persisted(
        &self,
        method: &MethodDescriptor,
        key: &MethodKey,
        cfg: &LocalCache,
    ) -> Option<Value> {
        let store = self.settings.persistent.as_ref()?;
        let data = store.restore(self.id(), key, cfg.tag.as_deref())?;
        if cfg.mode == CacheMode::StorageRestore && !self.cache().contains(self.id(), key) {
            let ttl = cfg.expire.resolve(&data, &Headers::new(), method.verb);
            self.cache().set_for_method(self.id(), method, data.clone(), ttl);
            metrics::counter!(telemetry::STORAGE_RESTORES_TOTAL).increment(1);
            debug!(context = %self.id(), key = %key, "restored persisted response into memory cache");
        }
        Some(data)
    }

    fn persist(&self, method: &MethodDescriptor, data: &Value, ttl: Ttl, tag: Option<&str>) {
        let Some(store) = &self.settings.persistent else {
            debug!(url = %method.url, "storage cache mode without a storage backend, not persisting");
            return;
        };
        if let Err(e) = store.persist_method(self.id(), method, data, ttl, tag) {
            warn!(
                storage = store.storage().name(),
                url = %method.url,
                error = %e,
                "failed to persist response"
            );
        }
    }

    // ===== Requests =====

    /// Resolve a method from cache or join/start its transport request.
    ///
    /// Must be called inside a Tokio runtime.
    pub(crate) fn dispatch(self: &Arc<Self>, method: MethodDescriptor, force: bool) -> SharedOutcome {
        let key = method.key();
        if !force && let Some(data) = self.cache().get(self.id(), &key) {
            debug!(context = %self.id(), key = %key, "serving cached response");
            let outcome: Outcome = Ok(data);
            if let Some(target) = self.bound(&key) {
                self.deliver(&target, &outcome);
            }
            return future::ready(outcome).boxed().shared();
        }

        self.update_bound(&key, StatePatch::new().loading(true).clear_error());

        let mut in_flight = lock(&self.in_flight);
        if let Some(existing) = in_flight.get(&key) {
            metrics::counter!(telemetry::DEDUPLICATED_TOTAL).increment(1);
            debug!(context = %self.id(), key = %key, "joining in-flight request");
            return existing.outcome.clone();
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (abort, registration) = AbortHandle::new_pair();
        let progress = self.progress_sink(&method, &key);
        let task = tokio::spawn(Arc::clone(self).run_request(
            method,
            key.clone(),
            id,
            registration,
            progress,
        ));
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(ReqstateError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared();
        in_flight.insert(
            key,
            InFlight {
                id,
                outcome: outcome.clone(),
                abort,
            },
        );
        outcome
    }

    async fn run_request(
        self: Arc<Self>,
        method: MethodDescriptor,
        key: MethodKey,
        id: u64,
        registration: AbortRegistration,
        progress: ProgressSink,
    ) -> Outcome {
        let cfg = self.local_cache_for(&method);
        let verb = method.verb.as_str();

        let mut request = method.clone();
        if let Some(before_request) = &self.settings.before_request {
            before_request(&mut request);
        }
        request.url = join_url(self.settings.base_url.as_deref(), &request.url);
        let timeout = request.config.timeout.or(self.settings.timeout);
        debug!(
            context = %self.id(),
            key = %key,
            verb,
            url = %request.url,
            adapter = self.adapter.name(),
            "sending request"
        );

        let started = Instant::now();
        let call = self.adapter.request(&request, progress);
        let call = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    Err(ReqstateError::Http(format!(
                        "request timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
                None => call.await,
            }
        };
        let result = Abortable::new(call, registration).await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "verb" => verb)
            .record(started.elapsed().as_secs_f64());

        let Ok(response) = result else {
            return self.aborted(&key, verb);
        };
        let processed = response.and_then(|response| self.process(response, &method));
        if !self.finish(&key, id) {
            return self.aborted(&key, verb);
        }

        match processed {
            Ok((data, headers)) => {
                let ttl = cfg.expire.resolve(&data, &headers, method.verb);
                self.cache()
                    .set_for_method(self.id(), &method, data.clone(), ttl);
                if cfg.persists() {
                    self.persist(&method, &data, ttl, cfg.tag.as_deref());
                }
                let outcome = Ok(data);
                if let Some(target) = self.bound(&key) {
                    self.deliver(&target, &outcome);
                }
                metrics::counter!(telemetry::REQUESTS_TOTAL, "verb" => verb, "status" => "ok")
                    .increment(1);
                outcome
            }
            Err(error) => {
                warn!(context = %self.id(), key = %key, error = %error, "request failed");
                let outcome = Err(error);
                if let Some(target) = self.bound(&key) {
                    self.deliver(&target, &outcome);
                }
                metrics::counter!(telemetry::REQUESTS_TOTAL, "verb" => verb, "status" => "error")
                    .increment(1);
                outcome
            }
        }
    }

    fn aborted(&self, key: &MethodKey, verb: &'static str) -> Outcome {
        debug!(context = %self.id(), key = %key, "request aborted, dropping its result");
        metrics::counter!(telemetry::REQUESTS_TOTAL, "verb" => verb, "status" => "aborted")
            .increment(1);
        Err(ReqstateError::Aborted)
    }

    /// `responded`, then the method's own `transform_data`.
    fn process(&self, response: Response, method: &MethodDescriptor) -> Result<(Value, Headers)> {
        let headers = response.headers.clone();
        let data = match &self.settings.responded {
            Some(responded) => responded(response)?,
            None => response.data,
        };
        let data = match &method.config.transform_data {
            Some(transform) => transform(data, &headers),
            None => data,
        };
        Ok((data, headers))
    }

    /// Retire request `id`. `false` when it was aborted in the meantime.
    fn finish(&self, key: &MethodKey, id: u64) -> bool {
        let mut in_flight = lock(&self.in_flight);
        match in_flight.get(key) {
            Some(entry) if entry.id == id => {
                in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    fn progress_sink(self: &Arc<Self>, method: &MethodDescriptor, key: &MethodKey) -> ProgressSink {
        let mut sink = ProgressSink::none();
        if method.config.enable_download {
            let inner = Arc::downgrade(self);
            let key = key.clone();
            sink = sink.on_download(move |progress| {
                if let Some(inner) = inner.upgrade() {
                    inner.update_bound(&key, StatePatch::new().downloading(progress));
                }
            });
        }
        if method.config.enable_upload {
            let inner = Arc::downgrade(self);
            let key = key.clone();
            sink = sink.on_upload(move |progress| {
                if let Some(inner) = inner.upgrade() {
                    inner.update_bound(&key, StatePatch::new().uploading(progress));
                }
            });
        }
        sink
    }

    /// Cancel the in-flight request of `key`.
    ///
    /// Its state immediately reads `loading: false, error: Aborted`, and
    /// nothing the transport produces afterwards reaches cache or state.
    pub(crate) fn abort(&self, key: &MethodKey) -> bool {
        let Some(entry) = lock(&self.in_flight).remove(key) else {
            return false;
        };
        entry.abort.abort();
        debug!(context = %self.id(), key = %key, request = entry.id, "aborting request");
        self.update_bound(
            key,
            StatePatch::new().loading(false).error(ReqstateError::Aborted),
        );
        true
    }

    pub(crate) fn is_in_flight(&self, key: &MethodKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    // ===== Manual cache access =====

    pub(crate) fn matching(&self, matcher: &MethodMatcher) -> Vec<MethodDescriptor> {
        match matcher {
            MethodMatcher::Method(method) => vec![method.clone()],
            MethodMatcher::Filter(filter) => self
                .cache()
                .snapshot_matching(self.id(), |method| filter(method)),
        }
    }

    /// Apply a manual cache write to one method. `false` when an updater
    /// declined.
    pub(crate) fn write_cache(&self, method: &MethodDescriptor, update: &CacheUpdate) -> bool {
        let key = method.key();
        let data = match update {
            CacheUpdate::Replace(data) => data.clone(),
            CacheUpdate::Update(updater) => match updater(self.cache().peek(self.id(), &key)) {
                Some(data) => data,
                None => {
                    debug!(context = %self.id(), key = %key, "cache updater declined");
                    return false;
                }
            },
        };

        let cfg = self.local_cache_for(method);
        let ttl = cfg.expire.resolve(&data, &Headers::new(), method.verb);
        self.cache()
            .set_for_method(self.id(), method, data.clone(), ttl);
        if cfg.persists() {
            self.persist(method, &data, ttl, cfg.tag.as_deref());
        }
        if let Some(target) = self.bound(&key) {
            let data = self.hydrate(&target, &data);
            self.hook.update(StatePatch::new().data(data), &target.state);
        }
        true
    }

    pub(crate) fn invalidate(&self, method: &MethodDescriptor) {
        let key = method.key();
        self.cache().remove(self.id(), &key);
        if let Some(store) = &self.settings.persistent {
            store.remove(self.id(), &key);
        }
        debug!(context = %self.id(), key = %key, "invalidated cached response");
    }
}

/// Prefix relative URLs with the context base URL.
pub(crate) fn join_url(base: Option<&str>, url: &str) -> String {
    match base {
        Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
            if url.is_empty() {
                return base.to_string();
            }
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::join_url;

    #[test]
    fn relative_urls_get_the_base() {
        assert_eq!(join_url(Some("http://api/"), "/users"), "http://api/users");
        assert_eq!(join_url(Some("http://api"), "users"), "http://api/users");
        assert_eq!(join_url(Some("http://api"), ""), "http://api");
    }

    #[test]
    fn absolute_urls_are_kept() {
        assert_eq!(
            join_url(Some("http://api"), "https://other/x"),
            "https://other/x"
        );
        assert_eq!(join_url(None, "/users"), "/users");
    }
}
