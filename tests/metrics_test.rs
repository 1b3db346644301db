//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;

use reqstate::telemetry;
use reqstate::{
    CacheMode, LocalCache, MemoryStorage, MethodDescriptor, ProgressSink, Reqstate, ReqstateError,
    RequestAdapter, RequestOrchestrator, Response, Result, Ttl, UseRequestConfig, WatchHook,
};

// ============================================================================
// Mock adapters
// ============================================================================

struct OkAdapter {
    delay: Duration,
}

#[async_trait]
impl RequestAdapter for OkAdapter {
    fn name(&self) -> &str {
        "ok"
    }

    async fn request(&self, _method: &MethodDescriptor, _progress: ProgressSink) -> Result<Response> {
        tokio::time::sleep(self.delay).await;
        Ok(Response::ok(json!({"ok": true})))
    }
}

struct FailingAdapter;

#[async_trait]
impl RequestAdapter for FailingAdapter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn request(&self, _method: &MethodDescriptor, _progress: ProgressSink) -> Result<Response> {
        Err(ReqstateError::Http("connection refused".to_string()))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and, optionally, one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            label.is_none_or(|(k, v)| {
                key.key()
                    .labels()
                    .any(|l| l.key() == k && l.value() == v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn orchestrator(adapter: impl RequestAdapter + 'static) -> RequestOrchestrator<WatchHook> {
    Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(adapter))
        .build()
        .unwrap()
}

fn instant() -> OkAdapter {
    OkAdapter {
        delay: Duration::ZERO,
    }
}

/// Runs `work` under a local recorder and returns what it recorded.
///
/// The runtime is current-thread so request tasks spawned by the
/// orchestrator run on the thread that holds the recorder.
fn record<F, Fut>(work: F) -> SnapshotVec
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(work())
    });
    snapshotter.snapshot().into_vec()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn successful_request_records_metrics() {
    let snapshot = record(|| async {
        let orch = orchestrator(instant());
        orch.fetch(&MethodDescriptor::get("/a"), false).await.unwrap();
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, Some(("layer", "memory"))),
        1
    );
    assert!(
        has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[test]
fn failed_request_records_error_status() {
    let snapshot = record(|| async {
        let orch = orchestrator(FailingAdapter);
        let _ = orch.fetch(&MethodDescriptor::get("/a"), false).await;
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "error"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        0
    );
}

#[test]
fn cache_hits_are_counted() {
    let snapshot = record(|| async {
        let orch = orchestrator(instant());
        let method = MethodDescriptor::get("/a");
        orch.fetch(&method, false).await.unwrap();
        orch.fetch(&method, false).await.unwrap();
        orch.fetch(&method, false).await.unwrap();
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("layer", "memory"))),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 1);
}

#[test]
fn joined_requests_are_counted_as_deduplicated() {
    let snapshot = record(|| async {
        let orch = orchestrator(OkAdapter {
            delay: Duration::from_millis(20),
        });
        let method = MethodDescriptor::get("/slow");
        let (a, b, c) = tokio::join!(
            orch.fetch(&method, false),
            orch.fetch(&method, false),
            orch.fetch(&method, false)
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
    });

    assert_eq!(counter_total(&snapshot, telemetry::DEDUPLICATED_TOTAL, None), 2);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 1);
}

#[test]
fn aborted_requests_record_aborted_status() {
    let snapshot = record(|| async {
        let orch = orchestrator(OkAdapter {
            delay: Duration::from_millis(200),
        });
        let method = MethodDescriptor::get("/slow");
        let handle = orch.use_request(method.clone(), UseRequestConfig::default());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.abort());
        tokio::time::sleep(Duration::from_millis(10)).await;
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "aborted"))),
        1
    );
}

fn stored_orchestrator(storage: &Arc<MemoryStorage>) -> RequestOrchestrator<WatchHook> {
    Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(instant()))
        .id("metrics")
        .storage(storage.clone())
        .build()
        .unwrap()
}

#[test]
fn storage_restores_are_counted() {
    let snapshot = record(|| async {
        let storage = Arc::new(MemoryStorage::new());
        let method = MethodDescriptor::get("/stored")
            .local_cache(LocalCache::new(Ttl::Infinite).mode(CacheMode::StorageRestore));

        stored_orchestrator(&storage).fetch(&method, false).await.unwrap();
        let restored = stored_orchestrator(&storage);
        let handle = restored.use_request(method, UseRequestConfig::default().immediate(false));
        assert!(handle.hit_storage());
    });

    assert_eq!(counter_total(&snapshot, telemetry::STORAGE_RESTORES_TOTAL, None), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("layer", "storage"))),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let orch = orchestrator(instant());
    orch.fetch(&MethodDescriptor::get("/a"), false).await.unwrap();
}
