//! Result shapes decoded from the external process's stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Decoded optimizer output.
///
/// Weights in `allocation` are opaque: nothing here checks that they sum to
/// 100 (or 1). Fields the optimizer reports beyond the required three are kept
/// verbatim in `extra` so they round-trip to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub allocation: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub expected_risk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metrics: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OptimizationResult {
    pub fn weight(&self, symbol: &str) -> Option<f64> {
        self.allocation.get(symbol).copied()
    }
}

/// Market data for one symbol. The key/value layout belongs to the fetch
/// script; only "it is a JSON object" is enforced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketData(pub Map<String, Value>);

impl MarketData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
