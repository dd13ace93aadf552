//! Defaulting rules for optimization requests and holdings.

use proptest::prelude::*;
use serde_json::json;

use portopt_core::domain::request::{
    DEFAULT_DATA_PERIOD, DEFAULT_TARGET_RETURN, DEFAULT_TARGET_RISK_LEVEL,
    DEFAULT_TOTAL_INVESTMENT,
};
use portopt_core::domain::{HoldingInput, Market, OptimizationRequest};

fn holding_with_basis(qty: f64, price: f64) -> HoldingInput {
    HoldingInput {
        quantity: Some(qty),
        purchase_price: Some(price),
        ..HoldingInput::new("AAPL")
    }
}

#[test]
fn ten_shares_at_one_hundred() {
    let req: OptimizationRequest = serde_json::from_value(json!({
        "stocks": [{"symbol": "X", "quantity": 10, "purchasePrice": 100}],
        "totalInvestment": null
    }))
    .unwrap();
    assert_eq!(req.shape().total_investment, 1000.0);
}

#[test]
fn empty_request_gets_every_default() {
    let payload = OptimizationRequest::default().shape();
    assert_eq!(payload.total_investment, DEFAULT_TOTAL_INVESTMENT);
    assert_eq!(payload.target_return, DEFAULT_TARGET_RETURN);
    assert_eq!(payload.target_risk_level, DEFAULT_TARGET_RISK_LEVEL);
    assert_eq!(payload.data_period, DEFAULT_DATA_PERIOD);
    assert_eq!(payload.optimization_method, "MPT");
    assert!(payload.use_real_data);
    assert!(payload.constraints.is_empty());
    assert!(payload.stocks.is_empty());
}

#[test]
fn payload_serializes_with_wire_names() {
    let req: OptimizationRequest = serde_json::from_value(json!({
        "stocks": [{"symbol": "000660.KS", "quantity": 2, "purchasePrice": 120000}],
        "targetRiskLevel": 7,
        "dataPeriod": "3years",
        "useRealData": false,
        "constraints": {"maxWeight": 0.4}
    }))
    .unwrap();
    let wire = serde_json::to_value(req.shape()).unwrap();
    assert_eq!(wire["targetRiskLevel"], 7.0);
    assert_eq!(wire["dataPeriod"], "3years");
    assert_eq!(wire["useRealData"], false);
    assert_eq!(wire["constraints"]["maxWeight"], 0.4);
    assert_eq!(wire["stocks"][0]["market"], "DOMESTIC");
    assert_eq!(wire["stocks"][0]["investmentAmount"], 240000.0);
    assert_eq!(wire["stocks"][0]["quantity"], 2.0);
}

proptest! {
    #[test]
    fn explicit_total_investment_is_never_replaced(
        total in 0.0f64..1e9,
        bases in prop::collection::vec((0.0f64..1e4, 0.0f64..1e4), 0..8),
    ) {
        let req = OptimizationRequest {
            stocks: bases.iter().map(|&(q, p)| holding_with_basis(q, p)).collect(),
            total_investment: Some(total),
            ..OptimizationRequest::default()
        };
        prop_assert_eq!(req.shape().total_investment, total);
    }

    #[test]
    fn missing_total_is_sum_of_cost_bases(
        bases in prop::collection::vec((0.0f64..1e4, 0.0f64..1e4), 1..8),
    ) {
        let req = OptimizationRequest {
            stocks: bases.iter().map(|&(q, p)| holding_with_basis(q, p)).collect(),
            ..OptimizationRequest::default()
        };
        let expected: f64 = bases.iter().map(|&(q, p)| q * p).sum();
        prop_assert!((req.shape().total_investment - expected).abs() <= 1e-6 * expected.max(1.0));
    }

    #[test]
    fn market_follows_suffix_when_absent(stem in "[A-Z0-9]{1,6}", suffix in prop::sample::select(vec!["", ".KS", ".KQ", ".T", ".L"])) {
        let symbol = format!("{stem}{suffix}");
        let req = OptimizationRequest {
            stocks: vec![HoldingInput::new(symbol)],
            ..OptimizationRequest::default()
        };
        let expected = if suffix == ".KS" || suffix == ".KQ" { Market::Domestic } else { Market::Foreign };
        prop_assert_eq!(req.shape().stocks[0].market, expected);
    }
}
