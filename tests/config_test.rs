//! Tests for TOML configuration.

use std::io::Write;
use std::time::Duration;

use reqstate::config::ReqstateConfig;
use reqstate::{CacheMode, ReqstateError, Ttl};

#[test]
fn empty_config_uses_defaults() {
    let config = ReqstateConfig::from_toml_str("").unwrap();

    assert_eq!(config, ReqstateConfig::default());
    assert_eq!(config.cache.max_entries, 10_000);
    assert!(!config.storage.enabled);
    assert!(config.local_cache().is_none());
}

#[test]
fn full_config_parses() {
    let config = ReqstateConfig::from_toml_str(
        r#"
        [http]
        base_url = "https://api.example.com"
        timeout_secs = 15

        [cache]
        expire_ms = 60000
        mode = "storage_restore"
        tag = "v2"
        max_entries = 500

        [storage]
        enabled = true
        dir = "/tmp/reqstate-config-test"
        "#,
    )
    .unwrap();

    assert_eq!(config.http.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(config.http.timeout(), Some(Duration::from_secs(15)));
    assert_eq!(config.cache.expire_ms, Some(Ttl::millis(60_000)));
    assert_eq!(config.cache.mode, CacheMode::StorageRestore);
    assert_eq!(config.cache.max_entries, 500);
    assert_eq!(
        config.storage.resolved_dir(),
        std::path::PathBuf::from("/tmp/reqstate-config-test")
    );

    let cache = config.local_cache().unwrap();
    assert_eq!(cache.mode, CacheMode::StorageRestore);
    assert_eq!(cache.tag.as_deref(), Some("v2"));
}

#[test]
fn infinity_expiry_parses() {
    let config = ReqstateConfig::from_toml_str(
        r#"
        [cache]
        expire_ms = "infinity"
        "#,
    )
    .unwrap();

    assert_eq!(config.cache.expire_ms, Some(Ttl::Infinite));
}

#[test]
fn invalid_expiry_is_rejected() {
    let err = ReqstateConfig::from_toml_str("[cache]\nexpire_ms = \"soon\"").unwrap_err();
    assert!(matches!(err, ReqstateError::Configuration(_)));
}

#[test]
fn unknown_cache_mode_is_rejected() {
    let err = ReqstateConfig::from_toml_str("[cache]\nexpire_ms = 1\nmode = \"disk\"").unwrap_err();
    assert!(matches!(err, ReqstateError::Configuration(_)));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn zero_capacity_is_rejected() {
    let err = ReqstateConfig::from_toml_str("[cache]\nmax_entries = 0").unwrap_err();
    assert!(err.to_string().contains("max_entries"));
}

#[test]
fn mode_without_expiry_is_rejected() {
    let err = ReqstateConfig::from_toml_str(
        "[cache]\nmode = \"storage_placeholder\"\n[storage]\nenabled = true",
    )
    .unwrap_err();
    assert!(err.to_string().contains("expire_ms"));
}

#[test]
fn storage_mode_requires_storage() {
    let err = ReqstateConfig::from_toml_str("[cache]\nexpire_ms = 1000\nmode = \"storage_restore\"")
        .unwrap_err();
    assert!(err.to_string().contains("storage.enabled"));
}

#[test]
fn blank_base_url_is_rejected() {
    let err = ReqstateConfig::from_toml_str("[http]\nbase_url = \"  \"").unwrap_err();
    assert!(err.to_string().contains("base_url"));
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn from_file_reads_and_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[http]\ntimeout_secs = 3").unwrap();

    let config = ReqstateConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.http.timeout(), Some(Duration::from_secs(3)));
}

#[test]
fn file_errors_name_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[cache]\nmax_entries = 0").unwrap();

    let err = ReqstateConfig::from_file(file.path()).unwrap_err();
    let path = file.path().display().to_string();
    assert!(err.to_string().contains(&path));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let err = ReqstateConfig::load(Some(std::path::Path::new("/nonexistent/reqstate.toml")))
        .unwrap_err();
    assert!(matches!(err, ReqstateError::Configuration(_)));
}
