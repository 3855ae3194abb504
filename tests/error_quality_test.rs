//! Error quality tests
//!
//! Verifies error messages are actionable and failures are classified the way
//! the scrape state machine expects.

use bmc_exporter::error::{ExporterError, ScrapeOutcome};

#[test]
fn test_status_error_names_url_and_code() {
    // Given: A status error from a drive URL
    let err = ExporterError::Status {
        url: "https://10.0.0.5/redfish/v1/Chassis/1/Drives/0/".to_string(),
        status: 503,
    };

    // When: Formatting the error
    let msg = err.to_string();

    // Then: Both the code and the resource appear
    assert!(msg.contains("503"), "Error should include status code: {}", msg);
    assert!(msg.contains("Drives/0"), "Error should include URL: {}", msg);
}

#[test]
fn test_auth_errors_are_distinguishable() {
    let unauthorized = ExporterError::Unauthorized("https://bmc/redfish/v1/Managers/".to_string());
    let auth = ExporterError::Auth("bmc rejected fresh credentials".to_string());

    assert!(unauthorized.to_string().contains("no credential rotation"));
    assert!(auth.to_string().starts_with("Authentication failed"));
}

#[test]
fn test_only_rotated_401_is_conclusive() {
    assert!(ExporterError::Auth("x".into()).is_conclusive_auth());
    assert!(!ExporterError::Unauthorized("x".into()).is_conclusive_auth());
    assert!(!ExporterError::Status { url: "x".into(), status: 403 }.is_conclusive_auth());
}

#[test]
fn test_classification() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

    let cases = [
        (ExporterError::Auth("x".into()), ScrapeOutcome::Authentication),
        (ExporterError::NotFound("x".into()), ScrapeOutcome::NotFound),
        (ExporterError::Json(json_err), ScrapeOutcome::Decode),
        (ExporterError::Decode("x".into()), ScrapeOutcome::Decode),
        (ExporterError::Status { url: "x".into(), status: 500 }, ScrapeOutcome::Transient),
        (ExporterError::Unauthorized("x".into()), ScrapeOutcome::Authentication),
        (ExporterError::SecretBackend("x".into()), ScrapeOutcome::Transient),
    ];

    for (err, expected) in cases {
        assert_eq!(err.classify(), expected, "wrong class for {}", err);
    }
}

#[test]
fn test_config_error_is_descriptive() {
    let err = ExporterError::Config("unknown hardware model 'c7000'".to_string());

    let msg = err.to_string();

    assert!(msg.starts_with("Configuration error"), "Unexpected prefix: {}", msg);
    assert!(msg.contains("c7000"));
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "ca.pem missing");

    let err: ExporterError = io.into();

    assert!(matches!(err, ExporterError::Io(_)));
    assert!(err.to_string().contains("ca.pem missing"));
}
