//! Request descriptors ("methods") and transport responses

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cache::LocalCache;
use crate::key::{MethodKey, compute_key};

/// Response headers, lower-cased names.
pub type Headers = BTreeMap<String, String>;

/// Per-method conversion of response data, run after the global `responded` hook.
pub type TransformData = Arc<dyn Fn(Value, &Headers) -> Value + Send + Sync>;

/// HTTP verb of a request descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Head => "HEAD",
            HttpVerb::Options => "OPTIONS",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Trace => "TRACE",
        }
    }

    /// GET and HEAD: responses are cached by default.
    pub fn is_safe(self) -> bool {
        matches!(self, HttpVerb::Get | HttpVerb::Head)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-identity configuration carried by a method.
///
/// Nothing in here contributes to the [`MethodKey`].
#[derive(Clone, Default)]
pub struct MethodConfig {
    /// Cache policy; falls back to the context default, then to the verb default.
    pub local_cache: Option<LocalCache>,
    /// Transport timeout; falls back to the context timeout.
    pub timeout: Option<Duration>,
    pub transform_data: Option<TransformData>,
    /// Forward download progress into request state.
    pub enable_download: bool,
    /// Forward upload progress into request state.
    pub enable_upload: bool,
}

impl fmt::Debug for MethodConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodConfig")
            .field("local_cache", &self.local_cache)
            .field("timeout", &self.timeout)
            .field("transform_data", &self.transform_data.is_some())
            .field("enable_download", &self.enable_download)
            .field("enable_upload", &self.enable_upload)
            .finish()
    }
}

/// Declarative description of a request.
///
/// Identity (and therefore the cache key) is derived from `verb`, `url`,
/// `params`, `body` and `headers` only.
///
/// ```rust
/// # use reqstate::MethodDescriptor;
/// let method = MethodDescriptor::get("/users")
///     .param("page", 2)
///     .header("accept", "application/json")
///     .local_cache(60_000u64);
/// assert_eq!(method.url, "/users");
/// ```
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub verb: HttpVerb,
    pub url: String,
    pub params: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, Value>,
    pub body: Option<Value>,
    pub config: MethodConfig,
}

impl MethodDescriptor {
    pub fn new(verb: HttpVerb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            config: MethodConfig::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpVerb::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpVerb::Head, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpVerb::Delete, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(HttpVerb::Options, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Value>) -> Self {
        Self::new(HttpVerb::Post, url).body(body)
    }

    pub fn put(url: impl Into<String>, body: impl Into<Value>) -> Self {
        Self::new(HttpVerb::Put, url).body(body)
    }

    pub fn patch(url: impl Into<String>, body: impl Into<Value>) -> Self {
        Self::new(HttpVerb::Patch, url).body(body)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn local_cache(mut self, cache: impl Into<LocalCache>) -> Self {
        self.config.local_cache = Some(cache.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn transform_data<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &Headers) -> Value + Send + Sync + 'static,
    {
        self.config.transform_data = Some(Arc::new(transform));
        self
    }

    pub fn enable_download(mut self) -> Self {
        self.config.enable_download = true;
        self
    }

    pub fn enable_upload(mut self) -> Self {
        self.config.enable_upload = true;
        self
    }

    /// Stable identity of this method.
    pub fn key(&self) -> MethodKey {
        compute_key(self)
    }
}

/// Identity fields of a method in a serialisable form.
///
/// Configuration and transforms are not carried over, so a round trip
/// yields a method with default config and the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMethod {
    pub verb: HttpVerb,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl From<&MethodDescriptor> for SerializedMethod {
    fn from(method: &MethodDescriptor) -> Self {
        Self {
            verb: method.verb,
            url: method.url.clone(),
            params: method.params.clone(),
            headers: method.headers.clone(),
            body: method.body.clone(),
        }
    }
}

impl From<SerializedMethod> for MethodDescriptor {
    fn from(serialized: SerializedMethod) -> Self {
        Self {
            verb: serialized.verb,
            url: serialized.url,
            params: serialized.params,
            headers: serialized.headers,
            body: serialized.body,
            config: MethodConfig::default(),
        }
    }
}

/// What a transport adapter hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub data: Value,
}

impl Response {
    /// A 200 response with no headers.
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            data: data.into(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}
