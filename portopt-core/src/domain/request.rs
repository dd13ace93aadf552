//! Request shapes sent across the process boundary, and their defaulting.
//!
//! Defaulting precedence for every optimization field is:
//! explicit value, else a value computed from the holdings, else a fixed constant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::holding::{Holding, HoldingInput};
use super::ids::SessionId;

/// Version stamped into every request payload.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_TOTAL_INVESTMENT: f64 = 10_000.0;
pub const DEFAULT_TARGET_RETURN: f64 = 10.0;
pub const DEFAULT_TARGET_RISK_LEVEL: f64 = 5.0;
pub const DEFAULT_DATA_PERIOD: &str = "1year";
pub const DEFAULT_METHOD: &str = "MPT";
pub const DEFAULT_USE_REAL_DATA: bool = true;

/// Period used for single-symbol price lookups.
pub const PRICE_PERIOD: &str = "1d";

/// Optimization request as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    #[serde(default)]
    pub stocks: Vec<HoldingInput>,
    #[serde(default)]
    pub total_investment: Option<f64>,
    #[serde(default)]
    pub target_return: Option<f64>,
    #[serde(default, alias = "targetRiskLevel")]
    pub risk_level: Option<f64>,
    #[serde(default)]
    pub data_period: Option<String>,
    #[serde(default)]
    pub optimization_method: Option<String>,
    #[serde(default)]
    pub use_real_data: Option<bool>,
    #[serde(default)]
    pub constraints: Option<Map<String, Value>>,
    /// Client-side session, if any. Not used to key persisted holdings.
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl OptimizationRequest {
    /// Sum of `quantity × purchasePrice` over holdings that carry both.
    ///
    /// `None` when no holding has a cost basis, even if `stocks` is non-empty:
    /// the payload then gets [`DEFAULT_TOTAL_INVESTMENT`] rather than a zero budget.
    pub fn derived_total_investment(&self) -> Option<f64> {
        let bases: Vec<f64> = self.stocks.iter().filter_map(HoldingInput::cost_basis).collect();
        if bases.is_empty() {
            None
        } else {
            Some(bases.iter().sum())
        }
    }

    /// Resolve every default and produce the payload the optimizer reads.
    pub fn shape(&self) -> OptimizationPayload {
        OptimizationPayload {
            schema_version: SCHEMA_VERSION,
            stocks: self.stocks.iter().map(Holding::from_input).collect(),
            total_investment: self
                .total_investment
                .or_else(|| self.derived_total_investment())
                .unwrap_or(DEFAULT_TOTAL_INVESTMENT),
            target_return: self.target_return.unwrap_or(DEFAULT_TARGET_RETURN),
            target_risk_level: self.risk_level.unwrap_or(DEFAULT_TARGET_RISK_LEVEL),
            data_period: non_blank(self.data_period.as_deref())
                .unwrap_or(DEFAULT_DATA_PERIOD)
                .to_string(),
            optimization_method: non_blank(self.optimization_method.as_deref())
                .unwrap_or(DEFAULT_METHOD)
                .to_string(),
            use_real_data: self.use_real_data.unwrap_or(DEFAULT_USE_REAL_DATA),
            constraints: self.constraints.clone().unwrap_or_default(),
        }
    }
}

/// Method passed positionally to the optimizer: trimmed, `MPT` when blank.
pub fn resolve_method(method: Option<&str>) -> String {
    non_blank(method).unwrap_or(DEFAULT_METHOD).to_string()
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Fully-defaulted optimization payload (the JSON written to the request artifact).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationPayload {
    pub schema_version: u32,
    pub stocks: Vec<Holding>,
    pub total_investment: f64,
    pub target_return: f64,
    pub target_risk_level: f64,
    pub data_period: String,
    pub optimization_method: String,
    pub use_real_data: bool,
    pub constraints: Map<String, Value>,
}

/// Market data lookup payload. Both fields are required; nothing is defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRequest {
    pub schema_version: u32,
    pub symbol: String,
    pub period: String,
}

impl MarketDataRequest {
    pub fn new(symbol: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            symbol: symbol.into(),
            period: period.into(),
        }
    }
}
