//! Reqstate - request-state orchestration with caching and deduplication
//!
//! This crate manages the lifecycle of declarative request descriptors
//! ("methods"): it fingerprints them into stable keys, serves fresh
//! responses from a memory cache, persists responses across restarts,
//! collapses concurrent identical requests into one transport call, and
//! pushes `loading`/`data`/`error`/progress transitions into observer
//! state through a pluggable states hook.
//!
//! # Example
//!
//! ```rust,no_run
//! use reqstate::{MethodDescriptor, Reqstate, UseRequestConfig, WatchHook};
//!
//! #[tokio::main]
//! async fn main() -> reqstate::Result<()> {
//!     let orchestrator = Reqstate::builder(WatchHook::new())
//!         .http()
//!         .base_url("https://api.example.com")
//!         .build()?;
//!
//!     let todos = orchestrator.use_request(
//!         MethodDescriptor::get("/todos").param("page", 1),
//!         UseRequestConfig::default(),
//!     );
//!
//!     let mut state = todos.state();
//!     state.wait_for(|s| !s.loading).await.ok();
//!     println!("{}", state.borrow().data);
//!     Ok(())
//! }
//! ```
//!
//! # Cache modes
//!
//! ```rust
//! use reqstate::{CacheMode, LocalCache, MethodDescriptor, Ttl};
//!
//! // Kept in memory for 10 seconds.
//! let short = MethodDescriptor::get("/prices").local_cache(10_000u64);
//!
//! // Persisted forever, restored into memory on first use after a restart.
//! let stored = MethodDescriptor::get("/countries").local_cache(
//!     LocalCache::new(Ttl::Infinite)
//!         .mode(CacheMode::StorageRestore)
//!         .tag("v1"),
//! );
//! # let _ = (short, stored);
//! ```

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod hooks;
pub mod key;
pub mod orchestrator;
pub mod rewrite;
mod sync;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use cache::{ContextId, FileStorage, MemoryStorage, PersistentStore, ResponseCacheStore, Storage};
pub use config::ReqstateConfig;
pub use error::{ReqstateError, Result};
pub use hooks::{EffectId, EffectRequest, StatesHook, WatchHook};
pub use key::{MethodKey, compute_key};
pub use orchestrator::{
    CacheUpdate, MethodMatcher, Reqstate, ReqstateBuilder, RequestHandle, RequestOrchestrator,
    UseRequestConfig, UseWatcherConfig,
};
pub use rewrite::Node;
#[cfg(feature = "http")]
pub use transport::HttpAdapter;
pub use transport::{ProgressSink, RequestAdapter};

// Re-export all types
pub use types::{
    CacheMode, Headers, HttpVerb, LocalCache, MethodConfig, MethodDescriptor, Progress,
    RequestState, Response, SerializedMethod, StaleTime, StatePatch, Ttl,
};
