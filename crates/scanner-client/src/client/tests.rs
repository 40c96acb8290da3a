//! Unit tests for client module.

use super::*;

// ============================================================================
// ClientConfig Tests
// ============================================================================

#[test]
fn test_client_config_default() {
    let config = ClientConfig::default();

    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.timeout, Duration::from_secs(30));
}

#[test]
fn test_client_config_custom() {
    let config = ClientConfig {
        base_url: "http://api.example.com:9000".to_string(),
        timeout: Duration::from_secs(60),
    };

    assert_eq!(config.base_url, "http://api.example.com:9000");
    assert_eq!(config.timeout, Duration::from_secs(60));
}

// ============================================================================
// ScannerClient Creation Tests
// ============================================================================

#[test]
fn test_scanner_client_new() {
    assert!(ScannerClient::new(ClientConfig::default()).is_ok());
}

#[test]
fn test_scanner_client_base_url_trimmed() {
    let client = ScannerClient::with_base_url("http://localhost:3000/").unwrap();
    assert_eq!(client.base_url(), "http://localhost:3000");
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[test]
fn test_error_from_api_body() {
    let err = ScannerClient::error_from(
        400,
        r#"{"error":"Invalid filter configuration: unknown filter kind: gamma","code":"INVALID_FILTER"}"#
            .to_string(),
    );
    match err {
        Error::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(code, "INVALID_FILTER");
            assert!(message.contains("gamma"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_error_from_not_found() {
    let err = ScannerClient::error_from(
        404,
        r#"{"error":"Symbol not found: BADSYM","code":"SYMBOL_NOT_FOUND"}"#.to_string(),
    );
    assert!(matches!(err, Error::NotFound(ref m) if m == "Symbol not found: BADSYM"));
}

#[test]
fn test_error_from_plain_text() {
    let err = ScannerClient::error_from(502, "bad gateway".to_string());
    assert!(matches!(err, Error::Api { status: 502, ref code, .. } if code.is_empty()));
}
