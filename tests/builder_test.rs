//! Tests for orchestrator construction.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use reqstate::config::ReqstateConfig;
use reqstate::{
    ContextId, MethodDescriptor, ProgressSink, Reqstate, ReqstateError, RequestAdapter,
    ResponseCacheStore, Response, Result, WatchHook,
};

struct StaticAdapter;

#[async_trait]
impl RequestAdapter for StaticAdapter {
    fn name(&self) -> &str {
        "static"
    }

    async fn request(&self, method: &MethodDescriptor, _progress: ProgressSink) -> Result<Response> {
        Ok(Response::ok(json!({ "url": method.url })))
    }
}

#[test]
fn build_without_adapter_fails() {
    let err = Reqstate::builder(WatchHook::new()).build().unwrap_err();
    assert_eq!(err, ReqstateError::NoAdapter);
}

#[test]
fn zero_cache_capacity_fails() {
    let err = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .max_cache_entries(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, ReqstateError::Configuration(_)));
}

#[test]
fn explicit_and_generated_ids() {
    let named = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .id("dashboard")
        .build()
        .unwrap();
    assert_eq!(named.id().as_str(), "dashboard");

    let a = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .build()
        .unwrap();
    let b = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .build()
        .unwrap();
    assert_ne!(a.id(), b.id());
}

#[cfg(feature = "http")]
#[test]
fn http_adapter_is_built_in() {
    let orch = Reqstate::builder(WatchHook::new()).http().build().unwrap();
    assert!(format!("{orch:?}").contains("http"));
}

#[tokio::test]
async fn shared_store_is_scoped_by_context() {
    let store = Arc::new(ResponseCacheStore::new());
    let build = |id: &str| {
        Reqstate::builder(WatchHook::new())
            .adapter(Arc::new(StaticAdapter))
            .cache_store(Arc::clone(&store))
            .id(id)
            .build()
            .unwrap()
    };
    let alice = build("alice");
    let bob = build("bob");
    let me = MethodDescriptor::get("/me");

    alice.fetch(&me, false).await.unwrap();

    assert!(alice.get_cache_data(&me).is_some());
    assert!(bob.get_cache_data(&me).is_none());
    assert!(store.contains(&ContextId::new("alice"), &me.key()));
}

#[tokio::test]
async fn config_supplies_defaults() {
    let config = ReqstateConfig::from_toml_str(
        r#"
        [http]
        base_url = "https://api.example.com"

        [cache]
        expire_ms = "infinity"
        "#,
    )
    .unwrap();
    let orch = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .config(&config)
        .build()
        .unwrap();
    let post = MethodDescriptor::post("/things", json!({}));

    let data = orch.fetch(&post, false).await.unwrap();

    assert_eq!(data, json!({"url": "https://api.example.com/things"}));
    // the context default makes even POST responses cacheable
    assert_eq!(orch.get_cache_data(&post), Some(data));
}

#[tokio::test]
async fn builder_settings_after_config_win() {
    let config = ReqstateConfig::from_toml_str("[http]\nbase_url = \"https://config.example\"").unwrap();
    let orch = Reqstate::builder(WatchHook::new())
        .adapter(Arc::new(StaticAdapter))
        .config(&config)
        .base_url("https://builder.example")
        .build()
        .unwrap();

    let data = orch.fetch(&MethodDescriptor::get("/x"), false).await.unwrap();
    assert_eq!(data, json!({"url": "https://builder.example/x"}));
}
