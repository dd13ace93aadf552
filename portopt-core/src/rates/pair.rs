use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback USD→KRW rate used when no live quote is available.
pub const FALLBACK_USD_KRW: f64 = 1456.0;
/// Fallback KRW→USD rate (≈ 1 / 1456).
pub const FALLBACK_KRW_USD: f64 = 0.000687;

/// An ordered currency pair, e.g. USD→KRW. Codes are stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.trim().to_ascii_uppercase(),
            to: to.trim().to_ascii_uppercase(),
        }
    }

    pub fn usd_krw() -> Self {
        Self::new("USD", "KRW")
    }

    /// Quote-service ticker: `{FROM}{TO}=X`.
    pub fn ticker(&self) -> String {
        format!("{}{}=X", self.from, self.to)
    }

    /// Hard-coded rate served when the live lookup fails.
    pub fn fallback_rate(&self) -> f64 {
        match (self.from.as_str(), self.to.as_str()) {
            ("USD", "KRW") => FALLBACK_USD_KRW,
            ("KRW", "USD") => FALLBACK_KRW_USD,
            _ => 1.0,
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.from, self.to)
    }
}

impl FromStr for CurrencyPair {
    type Err = String;

    /// Accepts `USD_KRW`, `USD/KRW` or `USDKRW`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (from, to) = if let Some((a, b)) = s.split_once(['_', '/']) {
            (a, b)
        } else if s.len() == 6 && s.is_ascii() {
            s.split_at(3)
        } else {
            return Err(format!("invalid currency pair '{s}'"));
        };
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(format!("invalid currency pair '{s}'"));
        }
        Ok(Self::new(from, to))
    }
}
