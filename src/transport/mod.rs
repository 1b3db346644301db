//! Transport adapters.
//!
//! A [`RequestAdapter`] turns a resolved [`MethodDescriptor`] into a
//! [`Response`]. The orchestrator owns everything around the call: base
//! URL joining, timeouts, cancellation and caching. Cancelling a request
//! drops the adapter's future, so adapters need no abort hook of their own.
//!
//! Non-2xx statuses must come back as [`ReqstateError::Api`](crate::ReqstateError::Api)
//! and network failures as [`ReqstateError::Http`](crate::ReqstateError::Http).

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use self::http::HttpAdapter;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{MethodDescriptor, Progress, Response};

type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Receives transfer progress from an adapter.
///
/// Directions nobody listens to are dropped, so adapters can report
/// unconditionally.
#[derive(Clone, Default)]
pub struct ProgressSink {
    download: Option<ProgressFn>,
    upload: Option<ProgressFn>,
}

impl ProgressSink {
    /// A sink that discards everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on_download<F>(mut self, f: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.download = Some(Arc::new(f));
        self
    }

    pub fn on_upload<F>(mut self, f: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.upload = Some(Arc::new(f));
        self
    }

    pub fn download(&self, loaded: u64, total: u64) {
        if let Some(f) = &self.download {
            f(Progress::new(loaded, total));
        }
    }

    pub fn upload(&self, loaded: u64, total: u64) {
        if let Some(f) = &self.upload {
            f(Progress::new(loaded, total));
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("download", &self.download.is_some())
            .field("upload", &self.upload.is_some())
            .finish()
    }
}

/// Issues requests on behalf of the orchestrator.
#[async_trait]
pub trait RequestAdapter: Send + Sync {
    /// Adapter name for logging/debugging.
    fn name(&self) -> &str;

    /// Perform the request.
    ///
    /// `method.url` is already joined with the context base URL and
    /// `before_request` has already run.
    async fn request(&self, method: &MethodDescriptor, progress: ProgressSink) -> Result<Response>;
}
