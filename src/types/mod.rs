//! Public types for the Reqstate API.

mod cache;
mod method;
mod state;

pub use cache::{CacheMode, DEFAULT_SAFE_TTL, LocalCache, StaleFn, StaleTime, Ttl};
pub use method::{
    Headers, HttpVerb, MethodConfig, MethodDescriptor, Response, SerializedMethod, TransformData,
};
pub use state::{Progress, RequestState, StatePatch};
