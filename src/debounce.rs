//! Trailing-edge debouncing of trigger callbacks.
//!
//! [`debounce`] wraps a callback so that a burst of calls results in a
//! single invocation with the last call's arguments, `delay` after the last
//! call. A bypass predicate, checked on every call, runs the callback
//! synchronously instead. Watchers use it so their first immediate trigger
//! is not delayed.
//!
//! Each [`Debounced`] owns its own timer; cancelling one never touches
//! another. Timers are tokio tasks, so calls must happen inside a runtime.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::sync::lock;

type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;
type Bypass = Arc<dyn Fn() -> bool + Send + Sync>;

/// A debounced callback. See [`debounce`].
pub struct Debounced<A> {
    callback: Callback<A>,
    delay: Duration,
    should_bypass: Bypass,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Wrap `f` so bursts of calls collapse into one call `delay` after the
/// last of them.
///
/// When `should_bypass()` returns true at call time, `f` runs immediately
/// on the calling thread and no timer is started. A timer already pending
/// from an earlier call is left running.
pub fn debounce<A, F, B>(f: F, delay: Duration, should_bypass: B) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
    B: Fn() -> bool + Send + Sync + 'static,
{
    Debounced {
        callback: Arc::new(f),
        delay,
        should_bypass: Arc::new(should_bypass),
        pending: Mutex::new(None),
    }
}

impl<A: Send + 'static> Debounced<A> {
    pub fn call(&self, args: A) {
        if (self.should_bypass)() {
            (self.callback)(args);
            return;
        }

        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(args);
        }));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.abort();
        }
    }

    /// Whether a delayed call is scheduled and has not run yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<A> Drop for Debounced<A> {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.abort();
        }
    }
}

impl<A> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
