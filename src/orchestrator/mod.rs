//! Request orchestration.
//!
//! A [`RequestOrchestrator`] ties one context's caches, transport adapter
//! and states hook together. Per invocation:
//!
//! 1. The method key is computed from the descriptor's identity fields.
//! 2. Unless forced, a fresh memory cache entry resolves the invocation
//!    without touching the transport.
//! 3. Otherwise the bound state goes `loading`, and the invocation either
//!    joins the in-flight request for the same key or starts one.
//! 4. On success the response runs through `responded` and the method's
//!    `transform_data`, is cached (and persisted in storage modes) and
//!    written into the bound state. On failure only the state's `error` is
//!    set; an existing cache entry survives.
//!
//! Aborting drops the transport future; nothing that request produces
//! reaches cache or state afterwards.

mod builder;
mod engine;
mod handle;
mod matcher;

pub use builder::{Reqstate, ReqstateBuilder};
pub use engine::{BeforeRequest, Responded};
pub use handle::RequestHandle;
pub use matcher::{CacheUpdate, CacheUpdater, MethodMatcher};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use self::engine::Inner;
use self::handle::{MethodSource, Trigger};
use crate::Result;
use crate::cache::{ContextId, ResponseCacheStore};
use crate::debounce::debounce;
use crate::hooks::{EffectRequest, Handler, StatesHook};
use crate::key::MethodKey;
use crate::rewrite::{Node, Rewritten, walk};
use crate::types::{MethodDescriptor, RequestState};

/// Options for [`RequestOrchestrator::use_request`].
#[derive(Debug, Clone)]
pub struct UseRequestConfig {
    /// Placeholder data, possibly containing response directives.
    pub initial_data: Option<Node>,
    /// Send as soon as the hook registers the effect (default: true).
    pub immediate: bool,
    /// Skip the memory cache on every send.
    pub force: bool,
}

impl Default for UseRequestConfig {
    fn default() -> Self {
        Self {
            initial_data: None,
            immediate: true,
            force: false,
        }
    }
}

impl UseRequestConfig {
    pub fn initial_data(mut self, data: impl Into<Node>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Options for [`RequestOrchestrator::use_watcher`].
#[derive(Debug, Clone, Default)]
pub struct UseWatcherConfig {
    pub initial_data: Option<Node>,
    /// Send once on registration, before any change (default: false).
    pub immediate: bool,
    /// Collapse bursts of changes; zero disables debouncing. The immediate
    /// send is never delayed.
    pub debounce: Duration,
    pub force: bool,
}

impl UseWatcherConfig {
    pub fn initial_data(mut self, data: impl Into<Node>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Request-state orchestrator for one context.
///
/// Cheap to clone; clones share caches, bound states and in-flight
/// requests.
pub struct RequestOrchestrator<H: StatesHook> {
    inner: Arc<Inner<H>>,
}

impl<H: StatesHook> RequestOrchestrator<H> {
    pub(crate) fn from_inner(inner: Inner<H>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> &ContextId {
        self.inner.id()
    }

    pub fn hook(&self) -> &H {
        &self.inner.hook
    }

    pub fn cache_store(&self) -> &ResponseCacheStore {
        self.inner.cache()
    }

    /// Bind a state to `method` and register it with the states hook.
    ///
    /// A persisted response takes priority over `initial_data`. Observers
    /// of the same key share one state.
    pub fn use_request(&self, method: MethodDescriptor, config: UseRequestConfig) -> RequestHandle<H> {
        let source: MethodSource = {
            let method = method.clone();
            Arc::new(move || method.clone())
        };
        let (trigger, hit_storage) = self.mount(&method, source, config.initial_data, config.force);
        let registration = self.inner.hook.effect_request(EffectRequest {
            handler: trigger.handler(),
            remove_states: trigger.remove_states(),
            watching: None,
            immediate: config.immediate,
        });
        RequestHandle::new(Arc::clone(&self.inner), trigger, hit_storage, registration)
    }

    /// Bind a state that re-sends whenever a watched source changes.
    ///
    /// `factory` is called on every send, so the method can depend on the
    /// watched values. The state is bound to the key of the first method
    /// the factory yields.
    pub fn use_watcher<F>(
        &self,
        factory: F,
        watching: Vec<H::Watched>,
        config: UseWatcherConfig,
    ) -> RequestHandle<H>
    where
        F: Fn() -> MethodDescriptor + Send + Sync + 'static,
    {
        let source: MethodSource = Arc::new(factory);
        let method = source();
        let (trigger, hit_storage) = self.mount(&method, source, config.initial_data, config.force);

        let handler: Handler = if config.debounce.is_zero() {
            trigger.handler()
        } else {
            let fire = Arc::clone(&trigger);
            let called = Arc::new(AtomicBool::new(false));
            let fired = Arc::clone(&called);
            let immediate = config.immediate;
            let debounced = debounce(
                move |()| {
                    fire.fire_and_forget();
                    fired.store(true, Ordering::SeqCst);
                },
                config.debounce,
                move || immediate && !called.load(Ordering::SeqCst),
            );
            Arc::new(move || debounced.call(()))
        };

        let registration = self.inner.hook.effect_request(EffectRequest {
            handler,
            remove_states: trigger.remove_states(),
            watching: Some(watching),
            immediate: config.immediate,
        });
        RequestHandle::new(Arc::clone(&self.inner), trigger, hit_storage, registration)
    }

    fn mount(
        &self,
        method: &MethodDescriptor,
        source: MethodSource,
        initial_data: Option<Node>,
        force: bool,
    ) -> (Arc<Trigger<H>>, bool) {
        let key = method.key();
        let cfg = self.inner.local_cache_for(method);
        let persisted = self.inner.restore_persisted(method, &key, &cfg);
        let hit_storage = persisted.is_some();
        let Rewritten { data, directives } = initial_data.map(walk).unwrap_or_default();
        let initial = RequestState::new(persisted.unwrap_or(data));
        debug!(context = %self.id(), key = %key, hit_storage, "binding request state");

        let target = self.inner.bind(&key, initial, directives);
        let trigger = Arc::new(Trigger::new(&self.inner, target, source, force));
        (trigger, hit_storage)
    }

    /// Resolve `method` without binding a state.
    ///
    /// A state already bound to the same key is updated as usual.
    pub async fn fetch(&self, method: &MethodDescriptor, force: bool) -> Result<Value> {
        self.inner.dispatch(method.clone(), force).await
    }

    /// Abort the in-flight request for `method`. `false` when none.
    pub fn abort(&self, method: &MethodDescriptor) -> bool {
        self.inner.abort(&method.key())
    }

    pub fn is_in_flight(&self, method: &MethodDescriptor) -> bool {
        self.inner.is_in_flight(&method.key())
    }

    /// Number of observers bound to `key`.
    pub fn observers(&self, key: &MethodKey) -> usize {
        self.inner.observer_count(key)
    }

    /// Fresh cached data for `method`.
    pub fn get_cache_data(&self, method: &MethodDescriptor) -> Option<Value> {
        self.inner.cache().get(self.id(), &method.key())
    }

    /// Write cache data for every matched method.
    ///
    /// The write follows each method's cache policy: it is skipped when
    /// caching is disabled, persisted in storage modes, and pushed into a
    /// bound state. Returns how many methods were written.
    pub fn set_cache_data(
        &self,
        matcher: impl Into<MethodMatcher>,
        update: impl Into<CacheUpdate>,
    ) -> usize {
        let update = update.into();
        let mut written = 0;
        for method in self.inner.matching(&matcher.into()) {
            if self.inner.write_cache(&method, &update) {
                written += 1;
            }
        }
        written
    }

    /// [`set_cache_data`](Self::set_cache_data) with an updater.
    pub fn update_cache_data<F>(&self, matcher: impl Into<MethodMatcher>, updater: F) -> usize
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        self.set_cache_data(matcher, CacheUpdate::with(updater))
    }

    /// Drop matched methods from the memory cache and from storage.
    pub fn invalidate_cache(&self, matcher: impl Into<MethodMatcher>) -> usize {
        let methods = self.inner.matching(&matcher.into());
        for method in &methods {
            self.inner.invalidate(method);
        }
        methods.len()
    }
}

impl<H: StatesHook> Clone for RequestOrchestrator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: StatesHook> fmt::Debug for RequestOrchestrator<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("id", self.id())
            .field("adapter", &self.inner.adapter.name())
            .finish_non_exhaustive()
    }
}
