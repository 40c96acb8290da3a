//! Unit tests for types module.

use super::*;

// ============================================================================
// FilterConfig Tests
// ============================================================================

#[test]
fn test_filter_constructors_serialize_as_tagged_params() {
    let json = serde_json::to_value(FilterConfig::delta(0.2, 0.35)).unwrap();
    assert_eq!(json["type"], "delta");
    assert_eq!(json["params"]["min"], 0.2);
    assert_eq!(json["params"]["max"], 0.35);

    let json = serde_json::to_value(FilterConfig::option_type(&[OptionType::Put])).unwrap();
    assert_eq!(json["type"], "option_type");
    assert_eq!(json["params"]["types"][0], "put");
}

#[test]
fn test_filter_config_deserializes_without_params() {
    let filter: FilterConfig = serde_json::from_str(r#"{"type":"volume"}"#).unwrap();
    assert_eq!(filter.kind, "volume");
    assert!(filter.params.is_null());
}

// ============================================================================
// Scan Request Tests
// ============================================================================

#[test]
fn test_scan_request_omits_unset_fields() {
    let json = serde_json::to_string(&ScanRequest::new(["AAPL", "MSFT"])).unwrap();
    assert_eq!(json, r#"{"symbols":["AAPL","MSFT"]}"#);
}

#[test]
fn test_scan_query_encoding() {
    let query = ScanQuery {
        filters: None,
        strategy: Some(SpreadStrategy::Debit),
        limit: Some(5),
    };
    let encoded = serde_urlencoded::to_string(&query).unwrap();
    assert_eq!(encoded, "strategy=debit&limit=5");
    assert_eq!(serde_urlencoded::to_string(ScanQuery::default()).unwrap(), "");
}

// ============================================================================
// Response Tests
// ============================================================================

#[test]
fn test_symbol_scan_response_error_only() {
    let response: SymbolScanResponse = serde_json::from_str(
        r#"{"symbol":"BADSYM","error":{"error":"Symbol not found: BADSYM","code":"SYMBOL_NOT_FOUND"}}"#,
    )
    .unwrap();
    assert!(response.result.is_none());
    assert_eq!(response.error.unwrap().code, "SYMBOL_NOT_FOUND");
}

#[test]
fn test_cache_invalidation_response_full_clear() {
    let response: CacheInvalidationResponse = serde_json::from_str(r#"{"removed":3}"#).unwrap();
    assert!(response.symbol.is_none());
    assert_eq!(response.removed, 3);
}

#[test]
fn test_display_impls() {
    assert_eq!(OptionType::Call.to_string(), "call");
    assert_eq!(SpreadStrategy::Credit.to_string(), "credit");
}
