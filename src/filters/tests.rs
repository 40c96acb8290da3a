//! Unit tests for filters module.

use super::*;
use crate::contract::fixtures::{contract, quoted};
use serde_json::json;

fn raw(kind: &str, params: Value) -> RawFilterConfig {
    RawFilterConfig::new(kind, params)
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_delta_with_params() {
    let config = FilterConfig::parse(&raw("delta", json!({"min": 0.2, "max": 0.35}))).unwrap();
    assert_eq!(
        config,
        FilterConfig::Delta(DeltaRange {
            min: 0.2,
            max: 0.35
        })
    );
}

#[test]
fn test_parse_defaults_when_params_missing() {
    let config = FilterConfig::parse(&raw("dte", Value::Null)).unwrap();
    assert_eq!(config, FilterConfig::Dte(DteRange { min: 0, max: 365 }));

    let config = FilterConfig::parse(&raw("delta", json!({}))).unwrap();
    assert_eq!(
        config,
        FilterConfig::Delta(DeltaRange {
            min: -1.0,
            max: 1.0
        })
    );
}

#[test]
fn test_parse_partial_params() {
    let config = FilterConfig::parse(&raw("dte", json!({"min": 30}))).unwrap();
    assert_eq!(config, FilterConfig::Dte(DteRange { min: 30, max: 365 }));
}

#[test]
fn test_parse_kind_is_case_and_whitespace_insensitive() {
    let config = FilterConfig::parse(&raw("  Volume ", json!({"min": 10}))).unwrap();
    assert_eq!(config, FilterConfig::Volume(MinCount { min: 10 }));
}

#[test]
fn test_parse_unknown_kind_fails() {
    let err = FilterConfig::parse(&raw("gamma_scalp", json!({}))).unwrap_err();
    assert_eq!(err, FilterError::UnknownKind("gamma_scalp".to_string()));
}

#[test]
fn test_parse_unknown_param_fails() {
    let err = FilterConfig::parse(&raw("volume", json!({"minimum": 10}))).unwrap_err();
    assert!(matches!(err, FilterError::MalformedParams { ref kind, .. } if kind == "volume"));
}

#[test]
fn test_parse_wrong_param_type_fails() {
    let err = FilterConfig::parse(&raw("dte", json!({"min": "thirty"}))).unwrap_err();
    assert!(matches!(err, FilterError::MalformedParams { .. }));
}

#[test]
fn test_parse_inverted_range_fails() {
    let err = FilterConfig::parse(&raw("dte", json!({"min": 60, "max": 30}))).unwrap_err();
    assert!(matches!(err, FilterError::InvalidRange { kind: "dte", .. }));
}

#[test]
fn test_parse_delta_out_of_bounds_fails() {
    let err = FilterConfig::parse(&raw("delta", json!({"min": 0.2, "max": 1.5}))).unwrap_err();
    assert!(matches!(err, FilterError::InvalidRange { kind: "delta", .. }));
}

#[test]
fn test_parse_negative_spread_fails() {
    let err = FilterConfig::parse(&raw("bid_ask_spread", json!({"max": -0.1}))).unwrap_err();
    assert!(matches!(err, FilterError::InvalidRange { .. }));
}

#[test]
fn test_raw_accepts_kind_and_parameters_aliases() {
    let parsed: RawFilterConfig =
        serde_json::from_str(r#"{"kind": "volume", "parameters": {"min": 5}}"#).unwrap();
    assert_eq!(parsed.kind, "volume");
    assert_eq!(
        FilterConfig::parse(&parsed).unwrap(),
        FilterConfig::Volume(MinCount { min: 5 })
    );
}

#[test]
fn test_from_raw_fails_whole_chain_on_one_bad_filter() {
    let configs = vec![
        raw("delta", json!({"min": 0.2, "max": 0.35})),
        raw("moon_phase", json!({})),
    ];
    assert!(matches!(
        FilterChain::from_raw(&configs),
        Err(FilterError::UnknownKind(_))
    ));
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_delta_and_dte_scenario() {
    let chain = FilterChain::from_raw(&[
        raw("delta", json!({"min": 0.20, "max": 0.35})),
        raw("dte", json!({"min": 30, "max": 60})),
    ])
    .unwrap();

    let pass = contract(OptionType::Call, 100.0, 0.28, 45);
    let reject = contract(OptionType::Call, 95.0, 0.50, 45);

    let outcome = chain.run(vec![pass.clone(), reject]);
    assert_eq!(outcome.survivors, vec![pass]);
    assert_eq!(outcome.input_count, 2);
}

#[test]
fn test_bid_ask_spread_scenario() {
    let chain = FilterChain::from_raw(&[raw("bid_ask_spread", json!({"max": 0.10}))]).unwrap();

    // spread 0.08 of mid 1.00
    let tight = quoted(OptionType::Put, 90.0, -0.3, 30, 0.96, 1.04);
    // spread 0.15 of mid 1.00
    let wide = quoted(OptionType::Put, 85.0, -0.2, 30, 0.925, 1.075);

    assert!(chain.apply(&tight));
    assert!(!chain.apply(&wide));
}

#[test]
fn test_delta_uses_absolute_value_for_puts() {
    let filter = FilterConfig::Delta(DeltaRange {
        min: 0.20,
        max: 0.35,
    });
    assert!(filter.accepts(&contract(OptionType::Put, 90.0, -0.25, 30)));
    assert!(!filter.accepts(&contract(OptionType::Put, 90.0, -0.45, 30)));
}

#[test]
fn test_delta_negative_bounds() {
    let filter = FilterConfig::Delta(DeltaRange {
        min: -0.35,
        max: -0.20,
    });
    assert!(filter.accepts(&contract(OptionType::Put, 90.0, -0.25, 30)));
    assert!(filter.accepts(&contract(OptionType::Call, 110.0, 0.30, 30)));
    assert!(!filter.accepts(&contract(OptionType::Call, 100.0, 0.50, 30)));
}

#[test]
fn test_default_delta_is_non_restrictive() {
    let filter = FilterConfig::parse(&raw("delta", json!({}))).unwrap();
    for delta in [-1.0, -0.5, 0.0, 0.01, 0.99, 1.0] {
        assert!(filter.accepts(&contract(OptionType::Call, 100.0, delta, 30)));
    }
}

#[test]
fn test_dte_bounds_are_inclusive() {
    let filter = FilterConfig::Dte(DteRange { min: 30, max: 60 });
    assert!(filter.accepts(&contract(OptionType::Call, 100.0, 0.3, 30)));
    assert!(filter.accepts(&contract(OptionType::Call, 100.0, 0.3, 60)));
    assert!(!filter.accepts(&contract(OptionType::Call, 100.0, 0.3, 29)));
    assert!(!filter.accepts(&contract(OptionType::Call, 100.0, 0.3, 61)));
}

#[test]
fn test_volume_open_interest_iv_and_liquidity() {
    let c = contract(OptionType::Call, 100.0, 0.3, 30);

    assert!(FilterConfig::Volume(MinCount { min: 500 }).accepts(&c));
    assert!(!FilterConfig::Volume(MinCount { min: 501 }).accepts(&c));
    assert!(FilterConfig::OpenInterest(MinCount { min: 2_000 }).accepts(&c));
    assert!(!FilterConfig::OpenInterest(MinCount { min: 2_001 }).accepts(&c));
    assert!(
        FilterConfig::IvPercentile(IvPercentileRange {
            min: 40.0,
            max: 60.0
        })
        .accepts(&c)
    );
    assert!(
        !FilterConfig::IvPercentile(IvPercentileRange {
            min: 70.0,
            max: 100.0
        })
        .accepts(&c)
    );
    assert!(FilterConfig::Liquidity(MinLiquidity { min: 1_000.0 }).accepts(&c));
    assert!(!FilterConfig::Liquidity(MinLiquidity { min: 1_001.0 }).accepts(&c));
}

#[test]
fn test_option_type_filter() {
    let filter = FilterConfig::OptionType(OptionTypes {
        types: vec![OptionType::Put],
    });
    assert!(filter.accepts(&contract(OptionType::Put, 90.0, -0.3, 30)));
    assert!(!filter.accepts(&contract(OptionType::Call, 110.0, 0.3, 30)));

    let any = FilterConfig::OptionType(OptionTypes { types: vec![] });
    assert!(any.accepts(&contract(OptionType::Call, 110.0, 0.3, 30)));
}

#[test]
fn test_empty_chain_accepts_everything() {
    let chain = FilterChain::default();
    assert!(chain.is_empty());
    assert!(chain.apply(&contract(OptionType::Call, 100.0, 0.9, 400)));
}

#[test]
fn test_chain_is_conjunction_of_filters() {
    let filters = vec![
        FilterConfig::Delta(DeltaRange {
            min: 0.1,
            max: 0.4,
        }),
        FilterConfig::Dte(DteRange { min: 20, max: 50 }),
        FilterConfig::Volume(MinCount { min: 400 }),
    ];
    let chain = FilterChain::build(filters.clone()).unwrap();

    for delta in [0.05, 0.1, 0.25, 0.4, 0.6] {
        for dte in [10, 20, 35, 50, 70] {
            for volume in [100, 400, 900] {
                let mut c = contract(OptionType::Call, 100.0, delta, dte);
                c.volume = volume;
                let expected = filters.iter().all(|f| f.accepts(&c));
                assert_eq!(chain.apply(&c), expected, "delta={delta} dte={dte} volume={volume}");
            }
        }
    }
}

#[test]
fn test_run_short_circuits_and_counts() {
    let chain = FilterChain::build(vec![
        FilterConfig::Dte(DteRange { min: 30, max: 60 }),
        FilterConfig::Volume(MinCount { min: 100 }),
    ])
    .unwrap();

    let contracts = vec![
        contract(OptionType::Call, 100.0, 0.3, 10),
        contract(OptionType::Call, 101.0, 0.3, 45),
        contract(OptionType::Call, 102.0, 0.3, 90),
        contract(OptionType::Call, 103.0, 0.3, 45),
    ];
    let outcome = chain.run(contracts);

    assert_eq!(outcome.survivors.len(), 2);
    assert_eq!(outcome.stats[0].evaluated, 4);
    assert_eq!(outcome.stats[0].passed, 2);
    // rejected contracts never reach the second filter
    assert_eq!(outcome.stats[1].evaluated, 2);
    assert_eq!(outcome.stats[1].passed, 2);
    assert!((outcome.stats[0].reduction() - 0.5).abs() < 1e-9);
    assert_eq!(outcome.stats[1].reduction(), 0.0);
}

#[test]
fn test_build_rejects_invalid_typed_config() {
    let err = FilterChain::build(vec![FilterConfig::IvPercentile(IvPercentileRange {
        min: 80.0,
        max: 20.0,
    })])
    .unwrap_err();
    assert!(matches!(err, FilterError::InvalidRange { kind: "iv_percentile", .. }));
}

// ============================================================================
// Canonical form
// ============================================================================

#[test]
fn test_canonical_json_ignores_order_and_defaults() {
    let a = FilterChain::from_raw(&[
        raw("delta", json!({"min": 0.2, "max": 0.35})),
        raw("dte", json!({"min": 30})),
    ])
    .unwrap();
    let b = FilterChain::from_raw(&[
        raw("DTE", json!({"max": 365, "min": 30})),
        raw("delta", json!({"max": 0.35, "min": 0.2})),
    ])
    .unwrap();

    assert_eq!(a.canonical_json(), b.canonical_json());
}

#[test]
fn test_canonical_json_distinguishes_parameters() {
    let a = FilterChain::from_raw(&[raw("volume", json!({"min": 10}))]).unwrap();
    let b = FilterChain::from_raw(&[raw("volume", json!({"min": 11}))]).unwrap();
    assert_ne!(a.canonical_json(), b.canonical_json());
}

#[test]
fn test_canonical_json_normalises_option_types() {
    let a = FilterChain::from_raw(&[raw("option_type", json!({"types": ["put", "call"]}))])
        .unwrap();
    let b = FilterChain::from_raw(&[raw("option_type", json!({"types": ["call", "put", "call"]}))])
        .unwrap();
    let both_as_empty = FilterChain::from_raw(&[raw("option_type", json!({}))]).unwrap();
    assert_eq!(a.canonical_json(), b.canonical_json());
    assert_eq!(a.canonical_json(), both_as_empty.canonical_json());

    let duplicated =
        FilterChain::from_raw(&[raw("option_type", json!({"types": ["put", "put"]}))]).unwrap();
    let single = FilterChain::from_raw(&[raw("option_type", json!({"types": ["put"]}))]).unwrap();
    assert_eq!(duplicated.canonical_json(), single.canonical_json());
    assert_ne!(single.canonical_json(), a.canonical_json());
}

#[test]
fn test_canonical_json_normalises_typed_chains() {
    let typed = FilterChain::build(vec![FilterConfig::OptionType(OptionTypes {
        types: vec![OptionType::Put, OptionType::Call],
    })])
    .unwrap();
    assert_eq!(
        typed.filters()[0],
        FilterConfig::OptionType(OptionTypes { types: vec![] })
    );
}

// ============================================================================
// Greek, volatility and spread-level filters
// ============================================================================

#[test]
fn test_parse_value_ranges() {
    let theta = FilterConfig::parse(&raw("theta", json!({"min": -0.05}))).unwrap();
    assert_eq!(
        theta,
        FilterConfig::Theta(ValueRange {
            min: Some(-0.05),
            max: None
        })
    );
    let iv = FilterConfig::parse(&raw("iv", Value::Null)).unwrap();
    assert_eq!(iv, FilterConfig::Iv(ValueRange::default()));

    assert!(matches!(
        FilterConfig::parse(&raw("vega", json!({"min": 0.5, "max": 0.1}))),
        Err(FilterError::InvalidRange { kind: "vega", .. })
    ));
    assert!(matches!(
        FilterConfig::parse(&raw("iv", json!({"min": -0.1}))),
        Err(FilterError::InvalidRange { kind: "iv", .. })
    ));
}

#[test]
fn test_greek_and_iv_filters() {
    // fixture: theta -0.03, vega 0.10, iv 0.30
    let c = contract(OptionType::Call, 100.0, 0.3, 30);
    let theta = |min, max| FilterConfig::Theta(ValueRange { min, max });
    assert!(theta(Some(-0.05), Some(0.0)).accepts(&c));
    assert!(!theta(Some(-0.02), None).accepts(&c));

    assert!(FilterConfig::Vega(ValueRange { min: Some(0.10), max: None }).accepts(&c));
    assert!(!FilterConfig::Vega(ValueRange { min: None, max: Some(0.05) }).accepts(&c));

    assert!(FilterConfig::Iv(ValueRange { min: Some(0.2), max: Some(0.4) }).accepts(&c));
    assert!(!FilterConfig::Iv(ValueRange { min: Some(0.35), max: None }).accepts(&c));
}

#[test]
fn test_pop_bounds_validated() {
    let pop = FilterConfig::parse(&raw("pop", json!({"min": 0.7}))).unwrap();
    assert_eq!(pop, FilterConfig::Pop(ProbabilityRange { min: 0.7, max: 1.0 }));
    assert!(pop.is_spread_level());

    assert!(matches!(
        FilterConfig::parse(&raw("pop", json!({"min": 1.5}))),
        Err(FilterError::InvalidRange { kind: "pop", .. })
    ));
}

#[test]
fn test_spread_filters_skip_contracts() {
    let chain = FilterChain::from_raw(&[
        raw("pop", json!({"min": 0.99})),
        raw("dte", json!({"min": 20})),
    ])
    .unwrap();
    assert!(chain.has_spread_filters());

    let outcome = chain.run(vec![
        contract(OptionType::Call, 100.0, 0.3, 30),
        contract(OptionType::Call, 105.0, 0.3, 10),
    ]);
    assert_eq!(outcome.survivors.len(), 1);
    assert_eq!(outcome.stats.len(), 1);
    assert_eq!(outcome.stats[0].kind, "dte");
    assert_eq!(outcome.stats[0].position, 1);
}

#[test]
fn test_filter_spreads_by_pop_and_width() {
    use crate::config::SpreadConfig;
    use crate::scanner::SpreadConstructor;
    use crate::scanner::SpreadStrategy;

    let calls = vec![
        quoted(OptionType::Call, 95.0, 0.70, 30, 6.90, 7.10),
        quoted(OptionType::Call, 100.0, 0.50, 30, 3.90, 4.10),
        quoted(OptionType::Call, 105.0, 0.30, 30, 1.90, 2.10),
        quoted(OptionType::Call, 110.0, 0.15, 30, 0.80, 0.90),
    ];
    let spreads = SpreadConstructor::new(SpreadConfig {
        min_width: 1.0,
        max_width: 20.0,
        risk_reward_weight: 0.5,
        probability_weight: 0.5,
        risk_reward_cap: 3.0,
    })
    .build(&calls, SpreadStrategy::Debit, 100);
    let total = spreads.len();
    assert!(total > 0);

    let chain = FilterChain::from_raw(&[
        raw("volume", json!({"min": 1})),
        raw("pop", json!({"min": 0.25, "max": 0.55})),
        raw("spread_width", json!({"max": 5.0})),
    ])
    .unwrap();
    let (kept, stats) = chain.filter_spreads(spreads);

    assert!(!kept.is_empty());
    for s in &kept {
        assert!((0.25..=0.55).contains(&s.probability_of_profit));
        assert!(s.width <= 5.0);
    }
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].kind, "pop");
    assert_eq!(stats[0].evaluated, total);
    assert_eq!(stats[1].evaluated, stats[0].passed);
    assert_eq!(stats[1].passed, kept.len());
}

#[test]
fn test_filter_error_display() {
    assert_eq!(
        FilterError::UnknownKind("foo".to_string()).to_string(),
        "unknown filter kind: foo"
    );
    let err = FilterError::InvalidRange {
        kind: "dte",
        reason: "min 5 greater than max 1".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "invalid range for dte filter: min 5 greater than max 1"
    );
}
