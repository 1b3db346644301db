//! State sinks.
//!
//! The orchestrator never touches observer state directly. It goes through a
//! [`StatesHook`], which decides what a state object is (a watch channel, a
//! UI framework signal, a plain mutex), how it is exported to consumers, and
//! when request handlers fire relative to the consumer's lifecycle.
//!
//! [`WatchHook`] is the built-in implementation over `tokio::sync::watch`.

mod watch;

pub use self::watch::{EffectId, WatchHook};

use std::fmt;
use std::sync::Arc;

use crate::types::{RequestState, StatePatch};

/// Triggers a request for the effect it was registered with.
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// Effect handed to [`StatesHook::effect_request`].
pub struct EffectRequest<W> {
    /// Issues the request. May be called any number of times.
    pub handler: Handler,
    /// Releases the orchestrator's binding. Must be called exactly once, when
    /// the consumer is torn down.
    pub remove_states: Box<dyn FnOnce() + Send>,
    /// Sources whose changes should re-run `handler`. `None` for plain
    /// requests.
    pub watching: Option<Vec<W>>,
    /// Run `handler` once right away.
    pub immediate: bool,
}

impl<W> fmt::Debug for EffectRequest<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRequest")
            .field("watching", &self.watching.as_ref().map(Vec::len))
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}

/// Capability interface between the orchestrator and an observer binding.
pub trait StatesHook: Send + Sync + 'static {
    /// Internal, mutable state handle.
    type State: Clone + Send + Sync + 'static;
    /// What consumers read.
    type Exported: Send + 'static;
    /// Source type accepted by watchers.
    type Watched: Send + 'static;
    /// Returned by [`effect_request`](Self::effect_request); lets the
    /// consumer tear down that one effect.
    type Registration: Clone + Send + Sync + 'static;

    fn create(&self, initial: RequestState) -> Self::State;

    fn export(&self, state: &Self::State) -> Self::Exported;

    /// Apply a partial update. Called without any orchestrator lock held.
    fn update(&self, patch: StatePatch, state: &Self::State);

    /// Current plain value of a state.
    fn dehydrate(&self, state: &Self::State) -> RequestState;

    fn effect_request(&self, request: EffectRequest<Self::Watched>) -> Self::Registration;
}
