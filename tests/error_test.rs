use reqstate::{ReqstateError, Result};

#[test]
fn test_error_display() {
    let err = ReqstateError::Api {
        status: 503,
        message: "maintenance".to_string(),
    };
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("maintenance"));
}

#[test]
fn test_aborted() {
    let err = ReqstateError::Aborted;
    assert!(err.is_aborted());
    assert!(!err.is_transport());
    assert_eq!(err.to_string(), "request aborted");
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(ReqstateError::NoAdapter)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn transport_errors() {
    assert!(ReqstateError::Http("connection reset".into()).is_transport());
    assert!(
        ReqstateError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_transport()
    );
}

#[test]
fn non_transport_errors() {
    assert!(!ReqstateError::Serialization("bad".into()).is_transport());
    assert!(!ReqstateError::Storage("disk full".into()).is_transport());
    assert!(!ReqstateError::TaskFailed("panicked".into()).is_transport());
    assert!(!ReqstateError::Configuration("x".into()).is_transport());
}

#[test]
fn status_only_for_api_errors() {
    assert_eq!(
        ReqstateError::Api {
            status: 404,
            message: String::new()
        }
        .status(),
        Some(404)
    );
    assert_eq!(ReqstateError::Http("x".into()).status(), None);
}

// ============================================================================
// Conversions
// ============================================================================

#[test]
fn from_serde_json() {
    let err: ReqstateError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(err, ReqstateError::Serialization(_)));
}

#[test]
fn from_io() {
    let err: ReqstateError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
    assert!(matches!(err, ReqstateError::Storage(_)));
}

#[test]
fn errors_are_cloneable_for_shared_outcomes() {
    let err = ReqstateError::Http("timeout".into());
    assert_eq!(err.clone(), err);
}
