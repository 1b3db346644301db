//! HTTP transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use super::{ProgressSink, RequestAdapter};
use crate::types::{Headers, MethodDescriptor, Response};
use crate::{ReqstateError, Result};

/// Transport that sends descriptors as HTTP requests.
///
/// Params become the query string, headers are sent as-is and the body is
/// JSON-encoded. Response bodies are parsed as JSON; anything else comes
/// back as a string, an empty body as `null`. Download progress is
/// reported per received chunk.
#[derive(Clone)]
pub struct HttpAdapter {
    http: Client,
}

impl HttpAdapter {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ReqstateError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Client with a transport-level timeout applied to every request.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReqstateError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Use a preconfigured client (proxies, TLS roots, default headers).
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RequestAdapter for HttpAdapter {
    fn name(&self) -> &str {
        "http"
    }

    async fn request(&self, method: &MethodDescriptor, progress: ProgressSink) -> Result<Response> {
        let verb = reqwest::Method::from_bytes(method.verb.as_str().as_bytes())
            .map_err(|e| ReqstateError::InvalidInput(e.to_string()))?;

        let mut request = self.http.request(verb, &method.url);
        if !method.params.is_empty() {
            let query: Vec<(&str, String)> = method
                .params
                .iter()
                .map(|(name, value)| (name.as_str(), plain_string(value)))
                .collect();
            request = request.query(&query);
        }
        for (name, value) in &method.headers {
            request = request.header(name.as_str(), plain_string(value));
        }
        let upload_len = match &method.body {
            Some(body) => {
                let bytes = serde_json::to_vec(body)?;
                let len = bytes.len() as u64;
                progress.upload(0, len);
                if !method.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    request = request.header(CONTENT_TYPE, "application/json");
                }
                request = request.body(bytes);
                Some(len)
            }
            None => None,
        };

        debug!(verb = %method.verb, url = %method.url, "sending HTTP request");
        let mut response = request
            .send()
            .await
            .map_err(|e| ReqstateError::Http(e.to_string()))?;
        if let Some(len) = upload_len {
            progress.upload(len, len);
        }

        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let total = response.content_length().unwrap_or(0);
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ReqstateError::Http(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            let loaded = body.len() as u64;
            progress.download(loaded, total.max(loaded));
        }

        if !status.is_success() {
            return Err(ReqstateError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(Response {
            status: status.as_u16(),
            headers,
            data: parse_body(&body),
        })
    }
}

/// Query and header values: strings verbatim, everything else as JSON.
fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
