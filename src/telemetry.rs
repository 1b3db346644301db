//! Telemetry metric name constants.
//!
//! Centralised metric names for reqstate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `reqstate_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `verb`: HTTP verb of the method (e.g. "GET", "POST")
//! - `status`: request outcome ("ok", "error", "aborted")
//! - `layer`: cache layer: "memory" or "storage"

/// Total transport requests issued by the orchestrator.
///
/// Cache hits and deduplicated joins are not counted.
/// Labels: `verb`, `status` ("ok" | "error" | "aborted").
pub const REQUESTS_TOTAL: &str = "reqstate_requests_total";

/// Transport request duration in seconds.
///
/// Labels: `verb`.
pub const REQUEST_DURATION_SECONDS: &str = "reqstate_request_duration_seconds";

/// Total cache hits.
///
/// Labels: `layer`.
pub const CACHE_HITS_TOTAL: &str = "reqstate_cache_hits_total";

/// Total cache misses.
///
/// Labels: `layer`.
pub const CACHE_MISSES_TOTAL: &str = "reqstate_cache_misses_total";

/// Invocations that joined an already in-flight request for the same key.
pub const DEDUPLICATED_TOTAL: &str = "reqstate_deduplicated_total";

/// Persisted responses copied back into the memory cache.
pub const STORAGE_RESTORES_TOTAL: &str = "reqstate_storage_restores_total";
