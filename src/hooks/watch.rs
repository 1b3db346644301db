//! `tokio::sync::watch` state sink

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{EffectRequest, StatesHook};
use crate::sync::lock;
use crate::types::{RequestState, StatePatch};

/// Identifies one registered effect of a [`WatchHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect-{}", self.0)
    }
}

struct Effect {
    watchers: Vec<JoinHandle<()>>,
    remove_states: Box<dyn FnOnce() + Send>,
}

impl Effect {
    fn dispose(self) {
        for watcher in self.watchers {
            watcher.abort();
        }
        (self.remove_states)();
    }
}

#[derive(Default)]
struct Effects {
    next: AtomicU64,
    live: Mutex<BTreeMap<EffectId, Effect>>,
}

/// State sink where each request state is a watch channel.
///
/// Consumers get a `watch::Receiver<RequestState>`. Watchers take
/// `watch::Receiver<Value>` sources and re-run their handler on every
/// change. An effect stays registered until it is disposed on its own with
/// [`dispose`](Self::dispose), or together with all others by
/// [`unmount`](Self::unmount), which plays the role of a component teardown.
///
/// Clones share the same set of effects.
#[derive(Clone, Default)]
pub struct WatchHook {
    effects: Arc<Effects>,
}

impl WatchHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop one effect's watchers and release its binding.
    ///
    /// `false` when the effect was already disposed.
    pub fn dispose(&self, id: EffectId) -> bool {
        let Some(effect) = lock(&self.effects.live).remove(&id) else {
            return false;
        };
        debug!(effect = %id, "disposing effect");
        effect.dispose();
        true
    }

    /// Stop every watcher and release every binding registered so far.
    pub fn unmount(&self) {
        let effects = std::mem::take(&mut *lock(&self.effects.live));
        debug!(effects = effects.len(), "unmounting watch hook");
        for effect in effects.into_values() {
            effect.dispose();
        }
    }

    /// Number of live effects.
    pub fn effect_count(&self) -> usize {
        lock(&self.effects.live).len()
    }
}

impl StatesHook for WatchHook {
    type State = Arc<watch::Sender<RequestState>>;
    type Exported = watch::Receiver<RequestState>;
    type Watched = watch::Receiver<Value>;
    type Registration = EffectId;

    fn create(&self, initial: RequestState) -> Self::State {
        let (sender, _) = watch::channel(initial);
        Arc::new(sender)
    }

    fn export(&self, state: &Self::State) -> Self::Exported {
        state.subscribe()
    }

    fn update(&self, patch: StatePatch, state: &Self::State) {
        state.send_modify(|current| patch.apply_to(current));
    }

    fn dehydrate(&self, state: &Self::State) -> RequestState {
        state.borrow().clone()
    }

    fn effect_request(&self, request: EffectRequest<Self::Watched>) -> EffectId {
        let EffectRequest {
            handler,
            remove_states,
            watching,
            immediate,
        } = request;

        if immediate {
            handler();
        }

        let watchers = watching
            .unwrap_or_default()
            .into_iter()
            .map(|mut source| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    while source.changed().await.is_ok() {
                        handler();
                    }
                })
            })
            .collect();

        let id = EffectId(self.effects.next.fetch_add(1, Ordering::Relaxed));
        lock(&self.effects.live).insert(
            id,
            Effect {
                watchers,
                remove_states,
            },
        );
        id
    }
}
