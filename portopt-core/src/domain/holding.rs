//! Holdings: submitted positions and their stored, fully-defaulted form.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

use super::ids::{HoldingId, SessionId};

/// Risk level assumed when a submission leaves it out (1–10 scale).
pub const DEFAULT_RISK_LEVEL: f64 = 5.0;

/// Symbol suffixes marking a domestic (KOSPI / KOSDAQ) listing.
pub const DOMESTIC_SUFFIXES: [&str; 2] = [".KS", ".KQ"];

/// Market classifier for a holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    Domestic,
    Foreign,
}

impl Market {
    /// Classify by symbol suffix: `.KS` / `.KQ` are domestic, everything else foreign.
    pub fn infer(symbol: &str) -> Self {
        if DOMESTIC_SUFFIXES.iter().any(|s| symbol.ends_with(s)) {
            Market::Domestic
        } else {
            Market::Foreign
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Domestic => "DOMESTIC",
            Market::Foreign => "FOREIGN",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An empty string counts as "not supplied", same as an absent field.
fn deserialize_market<'de, D>(deserializer: D) -> Result<Option<Market>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("DOMESTIC") => Ok(Some(Market::Domestic)),
        Some(s) if s.eq_ignore_ascii_case("FOREIGN") => Ok(Some(Market::Foreign)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unknown market '{other}' (expected DOMESTIC or FOREIGN)"
        ))),
    }
}

/// A holding as submitted by a client. Every field but the symbol is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingInput {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_market",
        skip_serializing_if = "Option::is_none"
    )]
    pub market: Option<Market>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<f64>,
}

impl HoldingInput {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// `quantity × purchasePrice` when both are present.
    pub fn cost_basis(&self) -> Option<f64> {
        match (self.quantity, self.purchase_price) {
            (Some(q), Some(p)) => Some(q * p),
            _ => None,
        }
    }
}

/// A fully-defaulted holding, as stored and as sent to the optimizer.
///
/// `id` and `session_id` are filled in by the holdings store; a holding that
/// was only shaped (never saved) has neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<HoldingId>,
    pub symbol: String,
    pub name: String,
    pub market: Market,
    pub investment_amount: f64,
    pub risk_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

impl Holding {
    /// Apply the per-field defaults to a submission.
    ///
    /// - market: explicit, else inferred from the symbol suffix
    /// - investment amount: explicit, else quantity × purchase price, else 0
    /// - risk level: explicit, else [`DEFAULT_RISK_LEVEL`]
    /// - name: explicit, else the symbol
    pub fn from_input(input: &HoldingInput) -> Self {
        let investment_amount = match input.investment_amount.or_else(|| input.cost_basis()) {
            Some(amount) => amount,
            None => {
                warn!(symbol = %input.symbol, "no investment amount or cost basis; using 0.0");
                0.0
            }
        };

        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&input.symbol)
            .to_string();

        Self {
            id: None,
            symbol: input.symbol.clone(),
            name,
            market: input.market.unwrap_or_else(|| Market::infer(&input.symbol)),
            investment_amount,
            risk_level: input.risk_level.unwrap_or(DEFAULT_RISK_LEVEL),
            session_id: None,
            quantity: input.quantity,
            purchase_price: input.purchase_price,
            current_price: input.current_price,
        }
    }

    /// Copy of this holding owned by `session`.
    pub fn stamped(&self, session: &SessionId) -> Self {
        Self {
            session_id: Some(session.clone()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_inferred_from_suffix() {
        assert_eq!(Market::infer("005930.KS"), Market::Domestic);
        assert_eq!(Market::infer("035720.KQ"), Market::Domestic);
        assert_eq!(Market::infer("AAPL"), Market::Foreign);
        assert_eq!(Market::infer("KS"), Market::Foreign);
    }

    #[test]
    fn aapl_submission_shapes_to_foreign_750() {
        let input: HoldingInput =
            serde_json::from_str(r#"{"symbol":"AAPL","quantity":5,"purchasePrice":150}"#).unwrap();
        let holding = Holding::from_input(&input);
        assert_eq!(holding.market, Market::Foreign);
        assert_eq!(holding.investment_amount, 750.0);
        assert_eq!(holding.risk_level, DEFAULT_RISK_LEVEL);
        assert_eq!(holding.name, "AAPL");
    }

    #[test]
    fn explicit_values_win_over_derived() {
        let input = HoldingInput {
            symbol: "005930.KS".into(),
            name: Some("Samsung".into()),
            market: Some(Market::Foreign),
            quantity: Some(10.0),
            purchase_price: Some(70_000.0),
            investment_amount: Some(1.0),
            risk_level: Some(8.0),
            ..HoldingInput::default()
        };
        let holding = Holding::from_input(&input);
        assert_eq!(holding.market, Market::Foreign);
        assert_eq!(holding.investment_amount, 1.0);
        assert_eq!(holding.risk_level, 8.0);
        assert_eq!(holding.name, "Samsung");
    }

    #[test]
    fn missing_amount_and_cost_basis_defaults_to_zero() {
        let input = HoldingInput {
            quantity: Some(3.0),
            ..HoldingInput::new("MSFT")
        };
        assert_eq!(Holding::from_input(&input).investment_amount, 0.0);
    }

    #[test]
    fn empty_market_string_is_treated_as_absent() {
        let input: HoldingInput =
            serde_json::from_str(r#"{"symbol":"000660.KS","market":""}"#).unwrap();
        assert_eq!(input.market, None);
        assert_eq!(Holding::from_input(&input).market, Market::Domestic);
    }

    #[test]
    fn unknown_market_is_rejected() {
        let err = serde_json::from_str::<HoldingInput>(r#"{"symbol":"X","market":"MOON"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn stamping_sets_session_only() {
        let holding = Holding::from_input(&HoldingInput::new("AAPL"));
        let stamped = holding.stamped(&SessionId::from("s1"));
        assert_eq!(stamped.session_id, Some(SessionId::from("s1")));
        assert_eq!(stamped.symbol, holding.symbol);
        assert_eq!(stamped.id, None);
    }

    #[test]
    fn serialized_holding_uses_camel_case_and_screaming_market() {
        let holding = Holding::from_input(&HoldingInput::new("AAPL"));
        let json = serde_json::to_value(&holding).unwrap();
        assert_eq!(json["market"], "FOREIGN");
        assert_eq!(json["investmentAmount"], 0.0);
        assert_eq!(json["riskLevel"], 5.0);
        assert!(json.get("sessionId").is_none());
    }
}
