//! Handles returned by `use_request` / `use_watcher`.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::engine::{Inner, SharedOutcome, Target};
use crate::hooks::{Handler, StatesHook};
use crate::key::MethodKey;
use crate::sync::lock;
use crate::types::{MethodDescriptor, RequestState, StatePatch};
use crate::{ReqstateError, Result};

/// Produces the method to send on each trigger.
pub(crate) type MethodSource = Arc<dyn Fn() -> MethodDescriptor + Send + Sync>;

/// Sends the current method on behalf of one bound state.
///
/// Holds the orchestrator weakly: triggers end up inside the states hook,
/// which the orchestrator owns.
pub(crate) struct Trigger<H: StatesHook> {
    inner: Weak<Inner<H>>,
    target: Target<H::State>,
    source: MethodSource,
    force: bool,
    last_key: Mutex<MethodKey>,
}

impl<H: StatesHook> Trigger<H> {
    pub(crate) fn new(
        inner: &Arc<Inner<H>>,
        target: Target<H::State>,
        source: MethodSource,
        force: bool,
    ) -> Self {
        let last_key = Mutex::new(target.key.clone());
        Self {
            inner: Arc::downgrade(inner),
            target,
            source,
            force,
            last_key,
        }
    }

    /// Send the current method. `None` once the orchestrator is gone.
    ///
    /// When the method's key differs from the bound one (a watcher whose
    /// source changed), the outcome is also delivered to the bound state,
    /// including an abort issued through any path.
    pub(crate) fn fire(&self, force: bool) -> Option<SharedOutcome> {
        let inner = self.inner.upgrade()?;
        let method = (self.source)();
        let key = method.key();
        *lock(&self.last_key) = key.clone();

        if key == self.target.key {
            return Some(inner.dispatch(method, force));
        }

        inner.hook.update(
            StatePatch::new().loading(true).clear_error(),
            &self.target.state,
        );
        let outcome = inner.dispatch(method, force);
        let pending = outcome.clone();
        let target = self.target.clone();
        let inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let outcome = pending.await;
            if let Some(inner) = inner.upgrade() {
                inner.deliver(&target, &outcome);
            }
        });
        Some(outcome)
    }

    /// Fire with the configured force flag, ignoring the outcome.
    pub(crate) fn fire_and_forget(&self) {
        let _ = self.fire(self.force);
    }

    pub(crate) fn handler(self: &Arc<Self>) -> Handler {
        let trigger = Arc::clone(self);
        Arc::new(move || trigger.fire_and_forget())
    }

    /// Disposer releasing this trigger's observer of the bound state.
    pub(crate) fn remove_states(&self) -> Box<dyn FnOnce() + Send> {
        let inner = Weak::clone(&self.inner);
        let key = self.target.key.clone();
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.release(&key);
            }
        })
    }
}

/// An observer's view of one request.
///
/// Dropping the handle does not release the bound state; the states hook
/// does that through the disposer it was handed, identified by
/// [`registration`](Self::registration).
pub struct RequestHandle<H: StatesHook> {
    inner: Arc<Inner<H>>,
    trigger: Arc<Trigger<H>>,
    hit_storage: bool,
    registration: H::Registration,
}

impl<H: StatesHook> RequestHandle<H> {
    pub(crate) fn new(
        inner: Arc<Inner<H>>,
        trigger: Arc<Trigger<H>>,
        hit_storage: bool,
        registration: H::Registration,
    ) -> Self {
        Self {
            inner,
            trigger,
            hit_storage,
            registration,
        }
    }

    /// What the states hook returned when this handle's effect was
    /// registered.
    pub fn registration(&self) -> &H::Registration {
        &self.registration
    }

    /// Exported state, as produced by the states hook.
    pub fn state(&self) -> H::Exported {
        self.inner.hook.export(&self.trigger.target.state)
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> RequestState {
        self.inner.hook.dehydrate(&self.trigger.target.state)
    }

    /// Key the state is bound to.
    pub fn key(&self) -> &MethodKey {
        &self.trigger.target.key
    }

    /// Whether the initial data came from persistent storage.
    pub fn hit_storage(&self) -> bool {
        self.hit_storage
    }

    /// Send the method again with the configured force flag.
    pub async fn send(&self) -> Result<Value> {
        self.send_with(self.trigger.force).await
    }

    /// Send the method again, bypassing the memory cache when `force`.
    pub async fn send_with(&self, force: bool) -> Result<Value> {
        match self.trigger.fire(force) {
            Some(outcome) => outcome.await,
            None => Err(ReqstateError::Configuration(
                "orchestrator has been dropped".to_string(),
            )),
        }
    }

    /// Abort the most recently sent request of this handle.
    ///
    /// `false` when nothing was in flight.
    pub fn abort(&self) -> bool {
        let key = lock(&self.trigger.last_key).clone();
        let aborted = self.inner.abort(&key);
        if aborted && key != self.trigger.target.key {
            self.inner.hook.update(
                StatePatch::new().loading(false).error(ReqstateError::Aborted),
                &self.trigger.target.state,
            );
        }
        aborted
    }

}

impl<H: StatesHook> Clone for RequestHandle<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            trigger: Arc::clone(&self.trigger),
            hit_storage: self.hit_storage,
            registration: self.registration.clone(),
        }
    }
}

impl<H: StatesHook> fmt::Debug for RequestHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("key", &self.trigger.target.key)
            .field("hit_storage", &self.hit_storage)
            .finish_non_exhaustive()
    }
}
