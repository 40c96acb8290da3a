//! Scan and filter endpoint tests.

use scanner_client::{Error, FilterConfig, OptionType, ScanRequest, SpreadStrategy};
use scanner_tests::spawn_server;

#[tokio::test]
async fn test_scan_symbol_options_only() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let filters = vec![FilterConfig::dte(20, 50), FilterConfig::option_type(&[OptionType::Put])];
    let scan = client
        .scan_symbol("aapl", Some(&filters), None, Some(15))
        .await
        .expect("Scan failed");

    assert_eq!(scan.symbol, "AAPL");
    assert!(scan.spreads.is_empty());
    assert!(scan.options.len() <= 15);
    assert_eq!(scan.result_count, scan.options.len());
    assert!(scan.filtered_count <= scan.total_contracts);
    for option in &scan.options {
        assert_eq!(option.option_type, OptionType::Put);
        assert!((20..=50).contains(&option.dte));
    }
}

#[tokio::test]
async fn test_scan_symbol_spreads_respect_sign() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");
    let filters = vec![FilterConfig::delta(0.10, 0.60), FilterConfig::dte(20, 70)];

    let credit = client
        .scan_symbol("SPY", Some(&filters), Some(SpreadStrategy::Credit), Some(25))
        .await
        .expect("Credit scan failed");
    assert!(!credit.spreads.is_empty());
    assert!(credit.spreads.len() <= 25);
    for spread in &credit.spreads {
        assert_eq!(spread.strategy, SpreadStrategy::Credit);
        assert!(spread.net_credit > 0.0);
        assert!(spread.max_loss > 0.0);
    }
    for pair in credit.spreads.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let debit = client
        .scan_symbol("SPY", Some(&filters), Some(SpreadStrategy::Debit), Some(25))
        .await
        .expect("Debit scan failed");
    assert!(debit.spreads.iter().all(|s| s.net_debit > 0.0));
}

#[tokio::test]
async fn test_scan_unknown_symbol_is_not_found() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let err = client
        .scan_symbol("BADSYM", None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_scan_rejects_unknown_filter() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");
    let filters = vec![FilterConfig::new("gamma", serde_json::json!({"min": 0.1}))];

    let err = client
        .scan_symbol("SPY", Some(&filters), None, None)
        .await
        .unwrap_err();
    match err {
        Error::Api { status, code, .. } => {
            assert_eq!(status, 400);
            assert_eq!(code, "INVALID_FILTER");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_scan_partial_failure() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let mut request = ScanRequest::new(["AAPL", "BADSYM", "aapl", "TSLA"]);
    request.max_results = Some(5);
    let response = client.scan_batch(&request).await.expect("Batch failed");

    let symbols: Vec<&str> = response.results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "BADSYM", "TSLA"]);
    assert_eq!(response.succeeded, 2);
    assert_eq!(response.failed, 1);
    assert!(response.results[0].result.is_some());
    assert_eq!(
        response.results[1].error.as_ref().map(|e| e.code.as_str()),
        Some("SYMBOL_NOT_FOUND")
    );
}

#[tokio::test]
async fn test_batch_scan_rejects_empty_request() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let err = client
        .scan_batch(&ScanRequest::new(Vec::<String>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_default_filters_roundtrip() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let initial = client.get_filters().await.expect("Get failed");
    assert_eq!(initial.count, 0);

    let filters = vec![FilterConfig::volume(10), FilterConfig::bid_ask_spread(0.5)];
    let updated = client.update_filters(filters.clone()).await.expect("Update failed");
    assert_eq!(updated.count, 2);

    let current = client.get_filters().await.expect("Get failed");
    assert_eq!(current.filters, filters);

    let bad = client
        .update_filters(vec![FilterConfig::dte(60, 30)])
        .await
        .unwrap_err();
    assert!(matches!(bad, Error::Api { status: 400, .. }));
    assert_eq!(client.get_filters().await.expect("Get failed").filters, filters);
}

#[tokio::test]
async fn test_validate_filters() {
    let server = spawn_server().await.expect("Failed to start server");
    let client = server.client().expect("Failed to create client");

    let ok = client
        .validate_filters(vec![FilterConfig::new("iv_percentile", serde_json::json!({}))])
        .await
        .expect("Validate failed");
    assert!(ok.valid);
    assert_eq!(ok.filters[0].params["max"], 100.0);

    let bad = client
        .validate_filters(vec![FilterConfig::new("gamma", serde_json::json!({}))])
        .await
        .expect("Validate failed");
    assert!(!bad.valid);
    assert!(bad.error.is_some());
}
